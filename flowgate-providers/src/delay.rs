// flowgate-providers/src/delay.rs
// ============================================================================
// Module: Delay Node Handler
// Description: Suspends traversal for a fixed duration.
// Purpose: Implement the `delay` entry of the default handler registry
//          (spec §4.4.3). Short delays sleep in-process; longer ones pause
//          the execution so the worker is not held hostage.
// Dependencies: flowgate-core, tokio
// ============================================================================

//! ## Overview
//! A delay under [`INLINE_SLEEP_CEILING`] blocks the execution task with
//! `tokio::time::sleep` and then continues traversal in the same call.
//! Anything longer pauses the execution exactly like an approval node,
//! carrying `resume_at` in its metadata; an operator or scheduler resumes it
//! once that time has passed. Delay nodes therefore reuse the same Resume
//! path as approvals, with no `approval_data` in the request.

use std::time::Duration;

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

/// Delays at or below this duration sleep inline instead of pausing.
pub const INLINE_SLEEP_CEILING: Duration = Duration::from_secs(30);

/// Handler for `delay` nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DelayHandler;

#[async_trait]
impl NodeHandler for DelayHandler {
    async fn execute(&self, _ctx: &HandlerContext, node: &Node, input: Value) -> HandlerOutcome {
        let NodeKind::Delay(config) = &node.kind else {
            return HandlerOutcome::Fail(FlowgateError::internal("delay handler invoked on non-delay node"));
        };
        let duration = Duration::from_secs(config.duration_seconds);
        if duration <= INLINE_SLEEP_CEILING {
            tokio::time::sleep(duration).await;
            return HandlerOutcome::Continue(input);
        }
        let resume_at = Timestamp::now().add_duration(duration);
        HandlerOutcome::Pause {
            metadata: json!({
                "duration_seconds": config.duration_seconds,
                "resume_at": resume_at.to_rfc3339(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_core::flow::DelayConfig;
    use flowgate_core::ids::ExecutionId;
    use flowgate_core::ids::NodeId;
    use flowgate_core::ids::OrgId;
    use flowgate_core::ids::ZoneId;

    fn ctx() -> HandlerContext {
        HandlerContext { zone_id: ZoneId::new("z"), org_id: OrgId::new("o"), execution_id: ExecutionId::new("e") }
    }

    #[tokio::test]
    async fn short_delay_continues_inline() {
        let node = Node {
            id: NodeId::new("d1"),
            position: Value::Null,
            kind: NodeKind::Delay(DelayConfig { duration_seconds: 0 }),
        };
        let outcome = DelayHandler.execute(&ctx(), &node, Value::Null).await;
        assert!(matches!(outcome, HandlerOutcome::Continue(_)));
    }

    #[tokio::test]
    async fn long_delay_pauses() {
        let node = Node {
            id: NodeId::new("d2"),
            position: Value::Null,
            kind: NodeKind::Delay(DelayConfig { duration_seconds: 3600 }),
        };
        let outcome = DelayHandler.execute(&ctx(), &node, Value::Null).await;
        assert!(matches!(outcome, HandlerOutcome::Pause { .. }));
    }
}
