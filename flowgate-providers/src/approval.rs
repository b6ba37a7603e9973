// flowgate-providers/src/approval.rs
// ============================================================================
// Module: Approval Node Handler
// Description: Suspends execution pending a human decision.
// Purpose: Implement the `approval` entry of the default handler registry
//          (spec §4.4.3, §4.4.5).
// Dependencies: flowgate-core, time
// ============================================================================

//! ## Overview
//! The approval handler never fails and never continues traversal on its
//! own — it always pauses, carrying the metadata the runtime persists on the
//! execution (`required_role`, `timeout_hours`, `requested_at`). Resumption
//! is handled entirely by `FlowEngine::resume`, not by this handler.

use async_trait::async_trait;
use flowgate_core::errors::FlowgateError;
use flowgate_core::execution::HandlerOutcome;
use flowgate_core::flow::Node;
use flowgate_core::flow::NodeKind;
use flowgate_core::interfaces::HandlerContext;
use flowgate_core::interfaces::NodeHandler;
use flowgate_core::time::Timestamp;
use serde_json::Value;
use serde_json::json;

/// Handler for `approval` nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApprovalHandler;

#[async_trait]
impl NodeHandler for ApprovalHandler {
    async fn execute(&self, _ctx: &HandlerContext, node: &Node, _input: Value) -> HandlerOutcome {
        let NodeKind::Approval(config) = &node.kind else {
            return HandlerOutcome::Fail(FlowgateError::internal("approval handler invoked on non-approval node"));
        };
        HandlerOutcome::Pause {
            metadata: json!({
                "required_role": config.approver_role,
                "timeout_hours": config.timeout_hours,
                "requested_at": Timestamp::now().to_rfc3339(),
                "message": config.message,
                "allow_multiple": config.allow_multiple,
            }),
        }
    }
}
