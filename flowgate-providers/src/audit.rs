// flowgate-providers/src/audit.rs
// ============================================================================
// Module: Audit Node Handler
// Description: Passthrough node that writes an audit record and echoes input.
// Purpose: Implement the `audit` entry of the default handler registry
//          (spec §4.4.3).
// Dependencies: flowgate-core
// ============================================================================

//! ## Overview
//! Mirrors the ambient audit-event pattern used across Flowgate
//! (`AuditSink` + a typed event struct) rather than logging through
//! `tracing`/`log`, neither of which this workspace depends on.

use std::sync::Arc;

use async_trait::async_trait;
use flowgate_core::execution::HandlerOutcome;
use flowgate_core::flow::Node;
use flowgate_core::interfaces::AuditSink;
use flowgate_core::interfaces::HandlerContext;
use flowgate_core::interfaces::NodeHandler;
use serde::Serialize;
use serde_json::Value;

/// Structured event emitted by [`AuditHandler`].
#[derive(Debug, Serialize)]
pub struct NodeAuditEvent {
    /// Execution the audit node ran within.
    pub execution_id: String,
    /// Node that produced this event.
    pub node_id: String,
    /// The input the node echoed.
    pub input: Value,
}

impl flowgate_core::interfaces::AuditEvent for NodeAuditEvent {
    fn event_type(&self) -> &'static str {
        "flow.node.audit"
    }
}

/// Handler for `audit` nodes.
pub struct AuditHandler {
    sink: Arc<dyn AuditSink>,
}

impl AuditHandler {
    /// Builds a new audit handler writing through `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl NodeHandler for AuditHandler {
    async fn execute(&self, ctx: &HandlerContext, node: &Node, input: Value) -> HandlerOutcome {
        let event = NodeAuditEvent {
            execution_id: ctx.execution_id.to_string(),
            node_id: node.id.to_string(),
            input: input.clone(),
        };
        self.sink.record(&event);
        HandlerOutcome::Continue(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_core::flow::NodeKind;
    use flowgate_core::ids::ExecutionId;
    use flowgate_core::ids::NodeId;
    use flowgate_core::ids::OrgId;
    use flowgate_core::ids::ZoneId;
    use flowgate_core::interfaces::NoopAuditSink;
    use serde_json::json;

    #[tokio::test]
    async fn echoes_input_unchanged() {
        let handler = AuditHandler::new(Arc::new(NoopAuditSink));
        let node = Node { id: NodeId::new("a1"), position: Value::Null, kind: NodeKind::Audit };
        let ctx = HandlerContext {
            zone_id: ZoneId::new("z"),
            org_id: OrgId::new("o"),
            execution_id: ExecutionId::new("e"),
        };
        let input = json!({"hello": "world"});
        let outcome = handler.execute(&ctx, &node, input.clone()).await;
        let HandlerOutcome::Continue(output) = outcome else {
            unreachable!("audit handler always continues")
        };
        assert_eq!(output, input);
    }
}
