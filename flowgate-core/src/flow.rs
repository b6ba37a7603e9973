// flowgate-core/src/flow.rs
// ============================================================================
// Module: Flowgate Flow Specification
// Description: Flow, Node, and Edge types plus upsert-time validation.
// Purpose: Define the canonical automation DAG schema and enforce the
//          single-trigger, reachable, acyclic invariants before a flow is
//          ever executed.
// Dependencies: crate::ids, crate::time, serde, serde_json
// ============================================================================

//! ## Overview
//! A flow is a user-defined DAG of typed nodes. Validation happens once, at
//! upsert time (`Flow::validate`), not on every execution — unknown node
//! types and cyclic graphs are rejected before a flow can ever run (spec §9
//! "Unknown node types fail at flow-creation validation, not at execution").

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::ids::EdgeId;
use crate::ids::FlowId;
use crate::ids::NodeId;
use crate::ids::OrgId;
use crate::ids::ZoneId;
use crate::time::Timestamp;

// ============================================================================
// SECTION: Flow
// ============================================================================

/// A user-defined automation DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// Flow identifier, stable across versioned updates.
    pub id: FlowId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Owning zone. A flow is mutable only through a versioned update that
    /// supersedes prior revisions; this struct represents one revision.
    pub zone_id: ZoneId,
    /// Human-readable flow name.
    pub name: String,
    /// Whether the flow is eligible for trigger matching.
    pub enabled: bool,
    /// Revision number, incremented on every versioned update.
    pub version: u64,
    /// Graph nodes.
    pub nodes: Vec<Node>,
    /// Graph edges.
    pub edges: Vec<Edge>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
}

impl Flow {
    /// Returns the flow's single trigger node.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError`] when the invariant (exactly one trigger node)
    /// does not hold. Call [`Flow::validate`] at upsert time so this never
    /// fails once a flow has been accepted.
    pub fn trigger_node(&self) -> Result<&Node, FlowError> {
        let mut triggers = self.nodes.iter().filter(|node| matches!(node.kind, NodeKind::Trigger(_)));
        let first = triggers.next().ok_or(FlowError::MissingTrigger)?;
        if triggers.next().is_some() {
            return Err(FlowError::MultipleTriggers);
        }
        Ok(first)
    }

    /// Returns the node with the given id, if present.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| &node.id == node_id)
    }

    /// Returns all edges whose source is `node_id`.
    #[must_use]
    pub fn outgoing_edges(&self, node_id: &NodeId) -> Vec<&Edge> {
        self.edges.iter().filter(|edge| &edge.source == node_id).collect()
    }

    /// Validates the flow's structural invariants:
    /// - exactly one trigger node,
    /// - every non-trigger node is reachable from the trigger,
    /// - the graph contains no cycles.
    ///
    /// # Errors
    ///
    /// Returns the first violated [`FlowError`].
    pub fn validate(&self) -> Result<(), FlowError> {
        ensure_unique_node_ids(&self.nodes)?;
        ensure_unique_edge_ids(&self.edges)?;
        ensure_edges_reference_known_nodes(&self.nodes, &self.edges)?;
        let trigger = self.trigger_node()?;
        ensure_all_nodes_reachable(&self.nodes, &self.edges, &trigger.id)?;
        ensure_acyclic(&self.nodes, &self.edges)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Node
// ============================================================================

/// A node within a flow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier, unique within the flow.
    pub id: NodeId,
    /// Opaque rendering hint (x/y position); not interpreted by the runtime.
    #[serde(default)]
    pub position: Value,
    /// Tagged node-type configuration.
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Tagged node-type variants and their type-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry node matched against inbound events.
    Trigger(TriggerConfig),
    /// Boolean evaluation against execution input.
    Condition(ConditionConfig),
    /// Outbound HTTP call.
    Webhook(WebhookConfig),
    /// Pauses the execution pending a human decision.
    Approval(ApprovalConfig),
    /// Suspends traversal for a fixed duration.
    Delay(DelayConfig),
    /// Applies a mapping expression to the input.
    Transform(TransformConfig),
    /// Passthrough that writes an audit record and echoes its input.
    Audit,
}

impl NodeKind {
    /// Returns the stable type name used in error messages and audit events.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Trigger(_) => "trigger",
            Self::Condition(_) => "condition",
            Self::Webhook(_) => "webhook",
            Self::Approval(_) => "approval",
            Self::Delay(_) => "delay",
            Self::Transform(_) => "transform",
            Self::Audit => "audit",
        }
    }
}

/// Trigger node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Event-type match pattern. `""` and `"*"` match any event type.
    #[serde(default)]
    pub event_type: String,
}

impl TriggerConfig {
    /// Returns true if this trigger matches the given event type.
    #[must_use]
    pub fn matches(&self, event_type: &str) -> bool {
        self.event_type.is_empty() || self.event_type == "*" || self.event_type == event_type
    }
}

/// Comparison operator for condition nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Strict equality.
    Equals,
    /// Numeric greater-than.
    Gt,
    /// Numeric less-than.
    Lt,
    /// Substring/array-element containment.
    Contains,
}

/// Condition node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// Dot-path field read from the execution input.
    pub field: String,
    /// Comparison operator.
    pub operator: ConditionOperator,
    /// Comparison value.
    pub value: Value,
}

/// Webhook/action node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Destination URL.
    pub url: String,
    /// HTTP method (`GET`, `POST`, ...).
    #[serde(default = "default_method")]
    pub method: String,
    /// Request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request body template (JSON with `{{field}}` substitutions resolved
    /// against the execution input at dispatch time).
    #[serde(default)]
    pub body: Value,
}

fn default_method() -> String {
    "POST".to_string()
}

/// Approval node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Role required to approve.
    pub approver_role: String,
    /// Hours before the approval token expires.
    pub timeout_hours: u32,
    /// Message shown to the approver.
    #[serde(default)]
    pub message: String,
    /// Whether multiple approvers may act on the same node.
    #[serde(default)]
    pub allow_multiple: bool,
}

/// Delay node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayConfig {
    /// Delay duration in seconds.
    pub duration_seconds: u64,
}

/// Transform node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// `JSONPath -> field name` mapping expression.
    pub mapping: HashMap<String, String>,
}

// ============================================================================
// SECTION: Edge
// ============================================================================

/// A directed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Edge identifier, unique within the flow.
    pub id: EdgeId,
    /// Source node id.
    pub source: NodeId,
    /// Target node id.
    pub target: NodeId,
    /// Branch handle disambiguating condition-node outputs (`"true"` /
    /// `"false"`). `None` for all other node types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Flow validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    /// The flow has no trigger node.
    #[error("flow must contain exactly one trigger node (none found)")]
    MissingTrigger,
    /// The flow has more than one trigger node.
    #[error("flow must contain exactly one trigger node (multiple found)")]
    MultipleTriggers,
    /// Duplicate node identifier.
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),
    /// Duplicate edge identifier.
    #[error("duplicate edge id: {0}")]
    DuplicateEdgeId(String),
    /// An edge references a node that does not exist.
    #[error("edge {edge} references unknown node: {node}")]
    UnknownNodeReference {
        /// Offending edge id.
        edge: String,
        /// Missing node id.
        node: String,
    },
    /// A node is not reachable from the trigger.
    #[error("node unreachable from trigger: {0}")]
    UnreachableNode(String),
    /// The graph contains a cycle.
    #[error("flow graph contains a cycle involving node: {0}")]
    CycleDetected(String),
}

// ============================================================================
// SECTION: Validation Helpers
// ============================================================================

fn ensure_unique_node_ids(nodes: &[Node]) -> Result<(), FlowError> {
    let mut seen = HashSet::new();
    for node in nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(FlowError::DuplicateNodeId(node.id.to_string()));
        }
    }
    Ok(())
}

fn ensure_unique_edge_ids(edges: &[Edge]) -> Result<(), FlowError> {
    let mut seen = HashSet::new();
    for edge in edges {
        if !seen.insert(edge.id.as_str()) {
            return Err(FlowError::DuplicateEdgeId(edge.id.to_string()));
        }
    }
    Ok(())
}

fn ensure_edges_reference_known_nodes(nodes: &[Node], edges: &[Edge]) -> Result<(), FlowError> {
    let known: HashSet<&str> = nodes.iter().map(|node| node.id.as_str()).collect();
    for edge in edges {
        if !known.contains(edge.source.as_str()) {
            return Err(FlowError::UnknownNodeReference {
                edge: edge.id.to_string(),
                node: edge.source.to_string(),
            });
        }
        if !known.contains(edge.target.as_str()) {
            return Err(FlowError::UnknownNodeReference {
                edge: edge.id.to_string(),
                node: edge.target.to_string(),
            });
        }
    }
    Ok(())
}

fn ensure_all_nodes_reachable(
    nodes: &[Node],
    edges: &[Edge],
    trigger_id: &NodeId,
) -> Result<(), FlowError> {
    let mut reachable: BTreeSet<&str> = BTreeSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(trigger_id.as_str());
    reachable.insert(trigger_id.as_str());
    while let Some(current) = queue.pop_front() {
        for edge in edges.iter().filter(|edge| edge.source.as_str() == current) {
            if reachable.insert(edge.target.as_str()) {
                queue.push_back(edge.target.as_str());
            }
        }
    }
    for node in nodes {
        if !reachable.contains(node.id.as_str()) {
            return Err(FlowError::UnreachableNode(node.id.to_string()));
        }
    }
    Ok(())
}

fn ensure_acyclic(nodes: &[Node], edges: &[Edge]) -> Result<(), FlowError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    fn visit<'a>(
        node_id: &'a str,
        nodes: &'a [Node],
        edges: &'a [Edge],
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Result<(), FlowError> {
        match marks.get(node_id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(FlowError::CycleDetected(node_id.to_string())),
            None => {}
        }
        marks.insert(node_id, Mark::Visiting);
        for edge in edges.iter().filter(|edge| edge.source.as_str() == node_id) {
            visit(edge.target.as_str(), nodes, edges, marks)?;
        }
        marks.insert(node_id, Mark::Done);
        Ok(())
    }

    for node in nodes {
        visit(node.id.as_str(), nodes, edges, &mut marks)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(id: &str) -> Node {
        Node {
            id: NodeId::new(id),
            position: Value::Null,
            kind: NodeKind::Trigger(TriggerConfig { event_type: "payment.created".to_string() }),
        }
    }

    fn audit(id: &str) -> Node {
        Node { id: NodeId::new(id), position: Value::Null, kind: NodeKind::Audit }
    }

    fn edge(id: &str, source: &str, target: &str) -> Edge {
        Edge { id: EdgeId::new(id), source: NodeId::new(source), target: NodeId::new(target), source_handle: None }
    }

    fn sample_flow(nodes: Vec<Node>, edges: Vec<Edge>) -> Flow {
        Flow {
            id: FlowId::new("f1"),
            org_id: OrgId::new("org1"),
            zone_id: ZoneId::new("z1"),
            name: "sample".to_string(),
            enabled: true,
            version: 1,
            nodes,
            edges,
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        }
    }

    #[test]
    fn valid_two_node_flow_passes() {
        let flow =
            sample_flow(vec![trigger("t"), audit("a")], vec![edge("e1", "t", "a")]);
        assert!(flow.validate().is_ok());
    }

    #[test]
    fn missing_trigger_rejected() {
        let flow = sample_flow(vec![audit("a")], vec![]);
        assert_eq!(flow.validate(), Err(FlowError::MissingTrigger));
    }

    #[test]
    fn multiple_triggers_rejected() {
        let flow = sample_flow(vec![trigger("t1"), trigger("t2")], vec![]);
        assert_eq!(flow.validate(), Err(FlowError::MultipleTriggers));
    }

    #[test]
    fn unreachable_node_rejected() {
        let flow = sample_flow(vec![trigger("t"), audit("a"), audit("b")], vec![edge("e1", "t", "a")]);
        assert_eq!(flow.validate(), Err(FlowError::UnreachableNode("b".to_string())));
    }

    #[test]
    fn cycle_rejected() {
        let flow = sample_flow(
            vec![trigger("t"), audit("a"), audit("b")],
            vec![edge("e1", "t", "a"), edge("e2", "a", "b"), edge("e3", "b", "a")],
        );
        assert!(matches!(flow.validate(), Err(FlowError::CycleDetected(_))));
    }
}
