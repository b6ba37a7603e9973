// flowgate-runtime/src/dispatch.rs
// ============================================================================
// Module: Trigger Dispatch
// Description: Per-entry trigger matching and execution-start fan-out
//              (spec §4.4.1).
// Purpose: Turn one dequeued bus entry into zero or more independently
//          spawned `FlowEngine::start_execution` calls, bounded by a shared
//          concurrency permit.
// Dependencies: flowgate-core, tokio
// ============================================================================

//! ## Overview
//! A matched flow is started as an independent task (spec §4.4.1 "no
//! cross-flow ordering"); the caller acks the bus entry once every match has
//! been spawned, not once the spawned tasks finish. A task that is still
//! in-flight when the worker shuts down races its own engine call against
//! the shutdown signal and persists the execution as cancelled rather than
//! leaving it stuck `running` (spec §5 "a cancelled execution MUST be
//! persisted as failed with an explicit cancelled error kind before the
//! task exits").

use std::sync::Arc;

use flowgate_core::errors::ErrorKind;
use flowgate_core::event::EventEnvelope;
use flowgate_core::execution::ExecutionStatus;
use flowgate_core::flow::Flow;
use flowgate_core::flow::NodeKind;
use flowgate_core::ids::ExecutionId;
use flowgate_core::interfaces::ApprovalSigner;
use flowgate_core::interfaces::AuditSink;
use flowgate_core::interfaces::BusEntry;
use flowgate_core::interfaces::LedgerClient;
use flowgate_core::interfaces::RunStore;
use flowgate_core::interfaces::StoreError;
use flowgate_core::time::monotonic_unix_nanos;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::audit::ExecutionCancelled;
use crate::audit::ExecutionStartFailed;
use crate::audit::TriggerMatched;
use crate::audit::TriggerUnmatched;
use flowgate_core::engine::FlowEngine;

/// Errors raised while dispatching one bus entry.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Enumerating enabled flows for the entry's zone failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The execution-start concurrency permit could not be acquired because
    /// the semaphore has been closed (never happens in normal operation;
    /// `Dispatcher` never calls `close`).
    #[error("execution dispatch semaphore closed")]
    SemaphoreClosed,
}

/// Matches dequeued events against enabled flows and fans out execution
/// starts, bounded by `max_inflight`.
pub struct Dispatcher<St, L, Sig> {
    run_store: Arc<St>,
    engine: Arc<FlowEngine<St, L, Sig>>,
    audit: Arc<dyn AuditSink>,
    inflight: Arc<Semaphore>,
}

impl<St, L, Sig> Dispatcher<St, L, Sig>
where
    St: RunStore + 'static,
    L: LedgerClient + 'static,
    Sig: ApprovalSigner + 'static,
{
    /// Builds a dispatcher bounding concurrent execution-start tasks to
    /// `max_inflight`.
    #[must_use]
    pub fn new(run_store: Arc<St>, engine: Arc<FlowEngine<St, L, Sig>>, audit: Arc<dyn AuditSink>, max_inflight: usize) -> Self {
        Self { run_store, engine, audit, inflight: Arc::new(Semaphore::new(max_inflight)) }
    }

    /// Matches `entry` against enabled flows for its zone and spawns an
    /// independent execution-start task for each match onto `tasks`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the flow lookup itself fails; callers
    /// should treat this as a transient read failure and not ack the entry.
    pub async fn dispatch(
        &self,
        entry: &BusEntry,
        tasks: &mut JoinSet<()>,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<(), DispatchError> {
        let envelope = entry.entry.envelope.clone();
        let flows = self.run_store.enabled_flows_for_zone(&envelope.zone_id).await?;
        let matched: Vec<Flow> = flows.into_iter().filter(|flow| flow_matches(flow, &envelope.event_type)).collect();

        if matched.is_empty() {
            self.audit.record(&TriggerUnmatched { event_id: envelope.id.to_string(), zone_id: envelope.zone_id.to_string() });
            return Ok(());
        }

        self.audit.record(&TriggerMatched {
            event_id: envelope.id.to_string(),
            zone_id: envelope.zone_id.to_string(),
            flow_ids: matched.iter().map(|flow| flow.id.to_string()).collect(),
        });

        for flow in matched {
            let permit = Arc::clone(&self.inflight).acquire_owned().await.map_err(|_| DispatchError::SemaphoreClosed)?;
            let engine = Arc::clone(&self.engine);
            let run_store = Arc::clone(&self.run_store);
            let audit = Arc::clone(&self.audit);
            let envelope = envelope.clone();
            let execution_id = ExecutionId::new(format!("exec_{}", monotonic_unix_nanos()));
            let mut shutdown_rx = shutdown.clone();
            tasks.spawn(async move {
                let _permit = permit;
                run_to_suspension(&engine, run_store.as_ref(), audit.as_ref(), &flow, execution_id, envelope, &mut shutdown_rx).await;
            });
        }
        Ok(())
    }
}

fn flow_matches(flow: &Flow, event_type: &str) -> bool {
    flow.trigger_node().is_ok_and(|trigger| match &trigger.kind {
        NodeKind::Trigger(config) => config.matches(event_type),
        _ => false,
    })
}

async fn run_to_suspension<St, L, Sig>(
    engine: &FlowEngine<St, L, Sig>,
    run_store: &St,
    audit: &dyn AuditSink,
    flow: &Flow,
    execution_id: ExecutionId,
    envelope: EventEnvelope,
    shutdown: &mut watch::Receiver<bool>,
) where
    St: RunStore,
    L: LedgerClient,
    Sig: ApprovalSigner,
{
    let flow_id = flow.id.to_string();
    let event_id = envelope.id.to_string();
    tokio::select! {
        () = wait_for_shutdown(shutdown) => {
            mark_cancelled(run_store, &execution_id, audit).await;
        }
        outcome = engine.start_execution(flow, execution_id.clone(), &envelope) => {
            if let Err(err) = outcome {
                audit.record(&ExecutionStartFailed { flow_id, event_id, reason: err.to_string() });
            }
        }
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Persists `execution_id` as failed with a `cancelled` marker if it is
/// still pending or running. A no-op if the execution already reached a
/// suspension point (paused, completed, or failed) before the race was
/// decided, or if it was never persisted at all.
async fn mark_cancelled<St: RunStore>(run_store: &St, execution_id: &ExecutionId, audit: &dyn AuditSink) {
    let Ok(mut execution) = run_store.load_execution(execution_id).await else { return };
    if !matches!(execution.status, ExecutionStatus::Pending | ExecutionStatus::Running) {
        return;
    }
    execution.metadata.insert("failureKind".to_string(), Value::String(error_kind_name(ErrorKind::Cancelled).to_string()));
    execution.fail();
    if run_store.save_execution(&execution).await.is_ok() {
        audit.record(&ExecutionCancelled { execution_id: execution_id.to_string() });
    }
}

const fn error_kind_name(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Cancelled => "cancelled",
        _ => "internal",
    }
}

#[cfg(test)]
mod tests {
    use flowgate_core::flow::Edge;
    use flowgate_core::flow::Node;
    use flowgate_core::flow::TriggerConfig;
    use flowgate_core::ids::EdgeId;
    use flowgate_core::ids::FlowId;
    use flowgate_core::ids::NodeId;
    use flowgate_core::ids::OrgId;
    use flowgate_core::ids::ZoneId;
    use flowgate_core::time::Timestamp;

    use super::*;

    fn trigger_flow(event_type: &str) -> Flow {
        Flow {
            id: FlowId::new("f1"),
            org_id: OrgId::new("org1"),
            zone_id: ZoneId::new("z1"),
            name: "sample".to_string(),
            enabled: true,
            version: 1,
            nodes: vec![
                Node { id: NodeId::new("t"), position: Value::Null, kind: NodeKind::Trigger(TriggerConfig { event_type: event_type.to_string() }) },
                Node { id: NodeId::new("a"), position: Value::Null, kind: NodeKind::Audit },
            ],
            edges: vec![Edge { id: EdgeId::new("e1"), source: NodeId::new("t"), target: NodeId::new("a"), source_handle: None }],
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        }
    }

    #[test]
    fn exact_event_type_matches() {
        assert!(flow_matches(&trigger_flow("payment.created"), "payment.created"));
        assert!(!flow_matches(&trigger_flow("payment.created"), "payment.refunded"));
    }

    #[test]
    fn wildcard_trigger_matches_any_event_type() {
        assert!(flow_matches(&trigger_flow(""), "anything"));
        assert!(flow_matches(&trigger_flow("*"), "anything"));
    }
}
