// flowgate-runtime/src/audit.rs
// ============================================================================
// Module: Runtime Audit Events
// Description: Structured audit events emitted by the stream-consumer
//              worker, in the ambient AuditSink pattern (no tracing/log).
// Dependencies: flowgate-core
// ============================================================================

use flowgate_core::interfaces::AuditEvent;
use serde::Serialize;

/// A dequeued event matched at least one enabled flow and executions were
/// started for each match.
#[derive(Debug, Serialize)]
pub struct TriggerMatched {
    /// Triggering event id.
    pub event_id: String,
    /// Zone the event belongs to.
    pub zone_id: String,
    /// Flow ids matched against the event.
    pub flow_ids: Vec<String>,
}

impl AuditEvent for TriggerMatched {
    fn event_type(&self) -> &'static str {
        "runtime.trigger_matched"
    }
}

/// A bus entry was read and acknowledged with no enabled flow matching it.
#[derive(Debug, Serialize)]
pub struct TriggerUnmatched {
    /// Triggering event id.
    pub event_id: String,
    /// Zone the event belongs to.
    pub zone_id: String,
}

impl AuditEvent for TriggerUnmatched {
    fn event_type(&self) -> &'static str {
        "runtime.trigger_unmatched"
    }
}

/// `FlowEngine::start_execution` returned `Err` for one matched flow. The
/// triggering entry is still acked; this flow's execution simply never
/// started (spec §4.4.1 only requires *other* matches to have started).
#[derive(Debug, Serialize)]
pub struct ExecutionStartFailed {
    /// Flow that failed to start.
    pub flow_id: String,
    /// Event that would have triggered the execution.
    pub event_id: String,
    /// Engine error, rendered as text.
    pub reason: String,
}

impl AuditEvent for ExecutionStartFailed {
    fn event_type(&self) -> &'static str {
        "runtime.execution_start_failed"
    }
}

/// A bus read failed and the worker is backing off before retrying.
#[derive(Debug, Serialize)]
pub struct BusReadFailed {
    /// Topic the read was attempted against.
    pub topic: String,
    /// Bus error, rendered as text.
    pub reason: String,
    /// Pause before the next retry, in milliseconds.
    pub retry_after_ms: u64,
}

impl AuditEvent for BusReadFailed {
    fn event_type(&self) -> &'static str {
        "runtime.bus_read_failed"
    }
}

/// An in-flight execution-start task was abandoned at shutdown before it
/// could persist a terminal state on its own.
#[derive(Debug, Serialize)]
pub struct ExecutionCancelled {
    /// Execution marked failed/cancelled.
    pub execution_id: String,
}

impl AuditEvent for ExecutionCancelled {
    fn event_type(&self) -> &'static str {
        "runtime.execution_cancelled"
    }
}
