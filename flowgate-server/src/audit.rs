// flowgate-server/src/audit.rs
// ============================================================================
// Module: Server Audit Sink
// Description: Structured audit events as JSON lines on stderr.
// Purpose: Give every collaborator built by `flowgate-server` a concrete
//          `AuditSink` instead of the library-only `NoopAuditSink`.
// Dependencies: flowgate-core, serde_json
// ============================================================================

use std::io::Write as _;

use flowgate_core::interfaces::AuditSink;
use flowgate_core::interfaces::erased_audit::ErasedAuditEvent;

/// Writes one JSON line per audit event to stderr. Never panics: a failed
/// write is dropped, matching [`AuditSink::record`]'s contract.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &dyn ErasedAuditEvent) {
        let payload = event.to_json();
        if let Ok(line) = serde_json::to_string(&serde_json::json!({
            "event_type": event.event_type(),
            "payload": payload,
        })) {
            let _ = writeln!(std::io::stderr(), "{line}");
        }
    }
}
