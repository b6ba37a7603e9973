// flowgate-runtime/src/supervisor.rs
// ============================================================================
// Module: Runtime Supervisor
// Description: Discovers `zone.*.event.*` topics and keeps one Worker per
//              topic alive (spec §4.4.1, §5).
// Purpose: Own the top-level shutdown signal `flowgate-server` drives, and
//          pick up newly created zone topics without a restart.
// Dependencies: flowgate-core, tokio
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use flowgate_core::interfaces::ApprovalSigner;
use flowgate_core::interfaces::AuditSink;
use flowgate_core::interfaces::LedgerClient;
use flowgate_core::interfaces::RunStore;
use flowgate_core::interfaces::StreamBus;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::task::JoinSet;

use crate::audit::BusReadFailed;
use crate::config::WorkerConfig;
use crate::dispatch::Dispatcher;
use crate::worker::Worker;

/// Builds and runs the runtime's topic-discovery loop.
pub struct Supervisor<St, L, Sig> {
    bus: Arc<dyn StreamBus>,
    dispatcher: Arc<Dispatcher<St, L, Sig>>,
    audit: Arc<dyn AuditSink>,
    config: WorkerConfig,
}

impl<St, L, Sig> Supervisor<St, L, Sig>
where
    St: RunStore + 'static,
    L: LedgerClient + 'static,
    Sig: ApprovalSigner + 'static,
{
    /// Builds a supervisor over `bus`, dispatching matched flows through
    /// `dispatcher` and provisioning one worker per discovered topic.
    #[must_use]
    pub fn new(bus: Arc<dyn StreamBus>, dispatcher: Arc<Dispatcher<St, L, Sig>>, audit: Arc<dyn AuditSink>, config: WorkerConfig) -> Self {
        Self { bus, dispatcher, audit, config }
    }

    /// Starts the discovery loop as a background task and returns a handle
    /// that stops it gracefully.
    #[must_use]
    pub fn spawn(self) -> RuntimeHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(discovery_loop(self.bus, self.dispatcher, self.audit, self.config, shutdown_rx));
        RuntimeHandle { shutdown_tx, handle }
    }
}

/// Handle to a running [`Supervisor`]. Dropping this without calling
/// [`RuntimeHandle::shutdown`] leaves the discovery loop and its workers
/// running detached; `flowgate-server` always calls `shutdown` from its own
/// graceful-shutdown sequence.
pub struct RuntimeHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RuntimeHandle {
    /// Signals shutdown and waits for every worker to finish draining its
    /// in-flight executions.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

async fn discovery_loop<St, L, Sig>(
    bus: Arc<dyn StreamBus>,
    dispatcher: Arc<Dispatcher<St, L, Sig>>,
    audit: Arc<dyn AuditSink>,
    config: WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) where
    St: RunStore + 'static,
    L: LedgerClient + 'static,
    Sig: ApprovalSigner + 'static,
{
    let mut known_topics = BTreeSet::new();
    let mut workers = JoinSet::new();

    while !*shutdown.borrow() {
        match bus.discover(&config.discover_pattern).await {
            Ok(topics) => {
                for topic in topics {
                    if known_topics.insert(topic.clone()) {
                        let worker = Worker::new(topic, Arc::clone(&bus), Arc::clone(&dispatcher), config.clone(), Arc::clone(&audit));
                        workers.spawn(worker.run(shutdown.clone()));
                    }
                }
            }
            Err(err) => {
                audit.record(&BusReadFailed { topic: config.discover_pattern.clone(), reason: err.to_string(), retry_after_ms: 0 });
            }
        }

        tokio::select! {
            () = tokio::time::sleep(config.rediscover_interval) => {}
            _ = shutdown.changed() => {}
        }
    }

    while workers.join_next().await.is_some() {}
}
