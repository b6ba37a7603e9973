// flowgate-gateway/src/audit.rs
// ============================================================================
// Module: Ingestion Gateway Audit Events
// Description: Structured audit events emitted by the emit and resume paths.
// Purpose: Give operators a typed record of every admission decision without
//          a tracing/log dependency (flowgate-core's AuditSink contract).
// Dependencies: flowgate-core, serde
// ============================================================================

use flowgate_core::interfaces::AuditEvent;
use serde::Serialize;

/// An event was accepted and published to the stream bus.
#[derive(Debug, Serialize)]
pub struct IngestAccepted {
    /// Minted event id.
    pub event_id: String,
    /// Zone the event was published under.
    pub zone_id: String,
    /// Event type.
    pub event_type: String,
    /// Topic the event was appended to.
    pub topic: String,
}

impl AuditEvent for IngestAccepted {
    fn event_type(&self) -> &'static str {
        "ingest.accepted"
    }
}

/// An ingest call resolved to a cached duplicate response.
#[derive(Debug, Serialize)]
pub struct IngestDuplicate {
    /// The event id of the original ingest this call duplicates.
    pub event_id: String,
    /// Zone the event belongs to.
    pub zone_id: String,
}

impl AuditEvent for IngestDuplicate {
    fn event_type(&self) -> &'static str {
        "ingest.duplicate"
    }
}

/// An ingest or resume call was rejected before taking effect.
#[derive(Debug, Serialize)]
pub struct RequestRejected {
    /// The route that rejected the request (`emit` or `resume`).
    pub route: &'static str,
    /// The taxonomy code the rejection was classified under.
    pub code: &'static str,
    /// Human-readable rejection reason.
    pub reason: String,
}

impl AuditEvent for RequestRejected {
    fn event_type(&self) -> &'static str {
        "request.rejected"
    }
}

/// A resume call took effect and drove the execution to a new state.
#[derive(Debug, Serialize)]
pub struct ResumeAccepted {
    /// The resumed execution id.
    pub execution_id: String,
    /// The execution's status after resume ran.
    pub status: String,
}

impl AuditEvent for ResumeAccepted {
    fn event_type(&self) -> &'static str {
        "resume.accepted"
    }
}
