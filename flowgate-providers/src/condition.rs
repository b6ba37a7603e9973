// flowgate-providers/src/condition.rs
// ============================================================================
// Module: Condition Node Handler
// Description: Evaluates {field, operator, value} against execution input.
// Purpose: Implement the `condition` entry of the default handler registry
//          (spec §4.4.3).
// Dependencies: flowgate-core, jsonpath_lib, serde_json
// ============================================================================

//! ## Overview
//! `field` is a dot-path (`order.amount`); it is translated to a root-anchored
//! `JSONPath` expression and resolved with `jsonpath_lib`, the same
//! resolution strategy the JSON evidence provider uses.

use async_trait::async_trait;
use flowgate_core::execution::HandlerOutcome;
use flowgate_core::flow::ConditionConfig;
use flowgate_core::flow::ConditionOperator;
use flowgate_core::flow::Node;
use flowgate_core::flow::NodeKind;
use flowgate_core::interfaces::HandlerContext;
use flowgate_core::interfaces::NodeHandler;
use serde_json::Value;
use serde_json::json;

/// Handler for `condition` nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionHandler;

#[async_trait]
impl NodeHandler for ConditionHandler {
    async fn execute(&self, _ctx: &HandlerContext, node: &Node, input: Value) -> HandlerOutcome {
        let NodeKind::Condition(config) = &node.kind else {
            return HandlerOutcome::Fail(flowgate_core::errors::FlowgateError::internal(
                "condition handler invoked on non-condition node",
            ));
        };
        let result = evaluate(config, &input);
        HandlerOutcome::Continue(json!({ "result": result }))
    }
}

fn evaluate(config: &ConditionConfig, input: &Value) -> bool {
    let Some(actual) = resolve_field(&config.field, input) else {
        return false;
    };
    match config.operator {
        ConditionOperator::Equals => *actual == config.value,
        ConditionOperator::Gt => compare_numbers(actual, &config.value, |a, b| a > b),
        ConditionOperator::Lt => compare_numbers(actual, &config.value, |a, b| a < b),
        ConditionOperator::Contains => contains(actual, &config.value),
    }
}

fn resolve_field<'a>(field: &str, input: &'a Value) -> Option<&'a Value> {
    let path = format!("$.{field}");
    let matches = jsonpath_lib::select(input, &path).ok()?;
    matches.into_iter().next()
}

fn compare_numbers(actual: &Value, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(s) => expected.as_str().is_some_and(|needle| s.contains(needle)),
        Value::Array(items) => items.contains(expected),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic, reason = "test-only assertions via let-else")]
    use super::*;
    use flowgate_core::ids::NodeId;

    fn node_with(config: ConditionConfig) -> Node {
        Node { id: NodeId::new("c1"), position: Value::Null, kind: NodeKind::Condition(config) }
    }

    #[tokio::test]
    async fn equals_matches_nested_field() {
        let handler = ConditionHandler;
        let node = node_with(ConditionConfig {
            field: "order.status".to_string(),
            operator: ConditionOperator::Equals,
            value: json!("paid"),
        });
        let ctx = HandlerContext {
            zone_id: flowgate_core::ids::ZoneId::new("z"),
            org_id: flowgate_core::ids::OrgId::new("o"),
            execution_id: flowgate_core::ids::ExecutionId::new("e"),
        };
        let input = json!({"order": {"status": "paid"}});
        let outcome = handler.execute(&ctx, &node, input).await;
        let HandlerOutcome::Continue(output) = outcome else { panic!("expected continue") };
        assert_eq!(output, json!({"result": true}));
    }

    #[tokio::test]
    async fn gt_false_when_field_missing() {
        let handler = ConditionHandler;
        let node = node_with(ConditionConfig {
            field: "order.amount".to_string(),
            operator: ConditionOperator::Gt,
            value: json!(10),
        });
        let ctx = HandlerContext {
            zone_id: flowgate_core::ids::ZoneId::new("z"),
            org_id: flowgate_core::ids::OrgId::new("o"),
            execution_id: flowgate_core::ids::ExecutionId::new("e"),
        };
        let outcome = handler.execute(&ctx, &node, json!({})).await;
        let HandlerOutcome::Continue(output) = outcome else { panic!("expected continue") };
        assert_eq!(output, json!({"result": false}));
    }
}
