// flowgate-core/src/execution.rs
// ============================================================================
// Module: Flowgate Flow Execution
// Description: FlowExecution, ExecutionStep, and the handler outcome type.
// Purpose: Model the execution state machine (spec §4.4.2) and the
//          handler dispatch contract (spec §4.4.3) as closed sum types
//          rather than sentinel errors.
// Dependencies: crate::ids, crate::time, crate::errors, serde_json
// ============================================================================

//! ## Overview
//! `HandlerOutcome` replaces the reference design's `execution_paused`
//! sentinel error with an explicit result variant: a handler either
//! continues traversal, pauses the execution, or fails it. Nothing downstream
//! ever matches an error message to detect a pause.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::errors::FlowgateError;
use crate::ids::EventId;
use crate::ids::ExecutionId;
use crate::ids::FlowId;
use crate::ids::Mode;
use crate::ids::NodeId;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Execution Status
// ============================================================================

/// Execution lifecycle state (spec §4.4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created, not yet dispatched.
    Pending,
    /// Traversal in progress.
    Running,
    /// Suspended at an approval/delay node awaiting Resume.
    Paused,
    /// Traversal reached a terminal node without pausing.
    Completed,
    /// Traversal failed or was cancelled.
    Failed,
}

impl ExecutionStatus {
    /// Returns true for the two terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Errors raised by illegal state transitions on [`FlowExecution`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// Attempted transition is not legal from the current status.
    #[error("illegal transition from {from:?} via {action}")]
    Illegal {
        /// Status the execution was in.
        from: ExecutionStatus,
        /// Attempted action name.
        action: &'static str,
    },
}

// ============================================================================
// SECTION: Execution Step
// ============================================================================

/// Per-node record, appended in visitation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// Node this step executed.
    pub node_id: NodeId,
    /// Step outcome status.
    pub status: StepStatus,
    /// Input the node received.
    pub input: Value,
    /// Output the node produced, if it did not fail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error message, if the node failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-step status, independent of the overall execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The node ran to completion and produced output.
    Completed,
    /// The node paused the execution.
    Paused,
    /// The node failed.
    Failed,
}

// ============================================================================
// SECTION: Handler Outcome
// ============================================================================

/// The result of dispatching one node to its [`crate::interfaces::NodeHandler`].
///
/// Deliberately a closed sum type rather than a sentinel error: a pause is a
/// normal, successful outcome, not a special-cased error value.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    /// Traversal continues to successor nodes with this output as their input.
    Continue(Value),
    /// The execution suspends at this node pending an out-of-band Resume.
    Pause {
        /// Metadata surfaced to the caller and persisted on the step
        /// (`required_role`, `timeout_hours`, `requested_at`, ...).
        metadata: Value,
    },
    /// The node failed; the execution transitions to `failed`.
    Fail(FlowgateError),
}

// ============================================================================
// SECTION: Flow Execution
// ============================================================================

/// A single run of a flow against one triggering event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowExecution {
    /// Execution identifier, unique per run.
    pub id: ExecutionId,
    /// Flow this execution is running.
    pub flow_id: FlowId,
    /// Flow revision this execution was started against.
    pub flow_version: u64,
    /// Event that triggered this execution.
    pub trigger_envelope_id: EventId,
    /// Test/live partition this execution runs under, inherited from the
    /// triggering envelope (or the resuming caller's key, for completeness
    /// of the invariant) so ledger writes never cross partitions.
    pub mode: Mode,
    /// Current lifecycle state.
    pub status: ExecutionStatus,
    /// Node the execution is paused at, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<NodeId>,
    /// Input to the first node (the trigger event's payload).
    pub input: Value,
    /// Final output, populated once `completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Per-node step log, appended in visitation order.
    pub steps: Vec<ExecutionStep>,
    /// Accumulated metadata (e.g. `approvalDecision`).
    pub metadata: BTreeMap<String, Value>,
    /// When the execution started.
    pub started_at: Timestamp,
    /// When the execution reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
}

impl FlowExecution {
    /// Starts a new execution in the `pending` state.
    #[must_use]
    pub fn new(
        id: ExecutionId,
        flow_id: FlowId,
        flow_version: u64,
        trigger_envelope_id: EventId,
        input: Value,
        mode: Mode,
    ) -> Self {
        Self {
            id,
            flow_id,
            flow_version,
            trigger_envelope_id,
            mode,
            status: ExecutionStatus::Pending,
            current_node_id: None,
            input,
            output: None,
            steps: Vec::new(),
            metadata: BTreeMap::new(),
            started_at: Timestamp::now(),
            ended_at: None,
        }
    }

    /// `pending -> running`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Illegal`] if not currently `pending`.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        if self.status != ExecutionStatus::Pending {
            return Err(TransitionError::Illegal { from: self.status, action: "start" });
        }
        self.status = ExecutionStatus::Running;
        Ok(())
    }

    /// Appends a step to the log.
    pub fn append_step(&mut self, step: ExecutionStep) {
        self.steps.push(step);
    }

    /// `running -> paused` at `node_id` with step metadata (spec §4.4.5).
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Illegal`] if not currently `running`.
    pub fn pause_at(&mut self, node_id: NodeId) -> Result<(), TransitionError> {
        if self.status != ExecutionStatus::Running {
            return Err(TransitionError::Illegal { from: self.status, action: "pause" });
        }
        self.status = ExecutionStatus::Paused;
        self.current_node_id = Some(node_id);
        Ok(())
    }

    /// `paused -> running`, clearing the pause marker.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Illegal`] if not currently `paused`.
    pub fn resume(&mut self) -> Result<(), TransitionError> {
        if self.status != ExecutionStatus::Paused {
            return Err(TransitionError::Illegal { from: self.status, action: "resume" });
        }
        self.status = ExecutionStatus::Running;
        self.current_node_id = None;
        Ok(())
    }

    /// `running -> completed`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError::Illegal`] if not currently `running`.
    pub fn complete(&mut self, output: Value) -> Result<(), TransitionError> {
        if self.status != ExecutionStatus::Running {
            return Err(TransitionError::Illegal { from: self.status, action: "complete" });
        }
        self.status = ExecutionStatus::Completed;
        self.output = Some(output);
        self.ended_at = Some(Timestamp::now());
        Ok(())
    }

    /// Transitions to `failed` from `running` or `paused` (spec §4.4.2,
    /// §4.4.6 step 2c). Terminal regardless of the prior state.
    pub fn fail(&mut self) {
        self.status = ExecutionStatus::Failed;
        self.ended_at = Some(Timestamp::now());
    }

    /// Returns true when metadata may still be mutated (not yet terminal).
    #[must_use]
    pub fn is_metadata_mutable(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Approval-decision overrides carried by a Resume request (spec §4.4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalOverride {
    /// Whether the approver granted the request.
    pub approved: bool,
    /// User id of the approver.
    pub approver_user_id: String,
    /// Role required by the approval node.
    pub required_role: String,
    /// Optional free-text reason.
    #[serde(default)]
    pub reason: Option<String>,
}

/// The body of a Resume request (spec §4.4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeRequest {
    /// Execution to resume.
    pub execution_id: ExecutionId,
    /// Approval decision, if the paused node is an approval node.
    #[serde(default)]
    pub approval_data: Option<ApprovalOverride>,
    /// Arbitrary overrides passed as input to the paused node's successors.
    #[serde(default)]
    pub overrides: Value,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "test-only assertions")]
    use super::*;

    fn sample() -> FlowExecution {
        FlowExecution::new(
            ExecutionId::new("ex1"),
            FlowId::new("f1"),
            1,
            EventId::new("evt_1"),
            Value::Null,
            Mode::Test,
        )
    }

    #[test]
    fn lifecycle_happy_path() {
        let mut exec = sample();
        exec.start().expect("pending -> running");
        exec.complete(Value::Null).expect("running -> completed");
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert!(exec.status.is_terminal());
    }

    #[test]
    fn pause_then_resume_then_complete() {
        let mut exec = sample();
        exec.start().expect("pending -> running");
        exec.pause_at(NodeId::new("n1")).expect("running -> paused");
        assert_eq!(exec.current_node_id, Some(NodeId::new("n1")));
        exec.resume().expect("paused -> running");
        assert!(exec.current_node_id.is_none());
        exec.complete(Value::Null).expect("running -> completed");
    }

    #[test]
    fn double_complete_is_illegal() {
        let mut exec = sample();
        exec.start().expect("pending -> running");
        exec.complete(Value::Null).expect("running -> completed");
        assert_eq!(
            exec.complete(Value::Null),
            Err(TransitionError::Illegal { from: ExecutionStatus::Completed, action: "complete" })
        );
    }

    #[test]
    fn resume_while_not_paused_is_illegal() {
        let mut exec = sample();
        exec.start().expect("pending -> running");
        assert_eq!(
            exec.resume(),
            Err(TransitionError::Illegal { from: ExecutionStatus::Running, action: "resume" })
        );
    }
}
