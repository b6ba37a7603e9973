// flowgate-providers/src/transform.rs
// ============================================================================
// Module: Transform Node Handler
// Description: Applies a JSONPath-to-field mapping expression to the input.
// Purpose: Implement the `transform` entry of the default handler registry
//          (spec §4.4.3).
// Dependencies: flowgate-core, jsonpath_lib, serde_json
// ============================================================================

//! ## Overview
//! Each `mapping` entry is `<output field name> -> <JSONPath into input>`.
//! Missing paths resolve to `null` rather than failing the node — a
//! transform is expected to tolerate sparse upstream data.

use async_trait::async_trait;
use flowgate_core::errors::FlowgateError;
use flowgate_core::execution::HandlerOutcome;
use flowgate_core::flow::Node;
use flowgate_core::flow::NodeKind;
use flowgate_core::interfaces::HandlerContext;
use flowgate_core::interfaces::NodeHandler;
use serde_json::Map;
use serde_json::Value;

/// Handler for `transform` nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransformHandler;

#[async_trait]
impl NodeHandler for TransformHandler {
    async fn execute(&self, _ctx: &HandlerContext, node: &Node, input: Value) -> HandlerOutcome {
        let NodeKind::Transform(config) = &node.kind else {
            return HandlerOutcome::Fail(FlowgateError::internal(
                "transform handler invoked on non-transform node",
            ));
        };
        let mut output = Map::new();
        for (field, path) in &config.mapping {
            let value = jsonpath_lib::select(&input, path)
                .ok()
                .and_then(|matches| matches.into_iter().next().cloned())
                .unwrap_or(Value::Null);
            output.insert(field.clone(), value);
        }
        HandlerOutcome::Continue(Value::Object(output))
    }
}
