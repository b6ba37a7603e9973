// flowgate-server/src/inspect.rs
// ============================================================================
// Module: Store Inspect Command
// Description: Operator tool listing executions a crashed worker left in a
//              given status, without retrying them.
// Purpose: Crashed `running` executions are never auto-retried (dispatching
//          a side-effecting webhook node twice has no idempotency guarantee
//          in this revision), so an operator needs a way to find them.
// Dependencies: flowgate-core, flowgate-store, serde_json
// ============================================================================

use std::io::Write as _;

use flowgate_core::execution::ExecutionStatus;
use flowgate_store::SqliteRunStore;
use flowgate_store::SqliteStoreConfig;
use thiserror::Error;

/// Errors raised while inspecting the run store.
#[derive(Debug, Error)]
pub enum InspectError {
    /// The store could not be opened.
    #[error("store error: {0}")]
    Store(String),
}

/// Opens the run store at `db_path` and prints, one JSON object per line,
/// every execution currently recorded with `status`.
///
/// # Errors
///
/// Returns [`InspectError`] if the store cannot be opened or queried.
pub fn inspect(db_path: &std::path::Path, status: ExecutionStatus) -> Result<(), InspectError> {
    let store = SqliteRunStore::open(&SqliteStoreConfig::new(db_path)).map_err(|err| InspectError::Store(err.to_string()))?;
    let executions = store.list_executions_by_status(status).map_err(|err| InspectError::Store(err.to_string()))?;
    let mut stdout = std::io::stdout();
    for execution in &executions {
        if let Ok(line) = serde_json::to_string(execution) {
            let _ = writeln!(stdout, "{line}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test-only assertions")]
    use flowgate_core::execution::FlowExecution;
    use flowgate_core::flow::Edge;
    use flowgate_core::flow::Flow;
    use flowgate_core::flow::Node;
    use flowgate_core::flow::NodeKind;
    use flowgate_core::flow::TriggerConfig;
    use flowgate_core::ids::EdgeId;
    use flowgate_core::ids::EventId;
    use flowgate_core::ids::ExecutionId;
    use flowgate_core::ids::FlowId;
    use flowgate_core::ids::NodeId;
    use flowgate_core::ids::OrgId;
    use flowgate_core::ids::ZoneId;
    use flowgate_core::interfaces::RunStore as _;
    use flowgate_core::time::Timestamp;
    use serde_json::Value;

    use super::*;

    fn sample_flow() -> Flow {
        let trigger = Node { id: NodeId::new("n1"), position: Value::Null, kind: NodeKind::Trigger(TriggerConfig { event_type: "order.created".to_string() }) };
        let audit = Node { id: NodeId::new("n2"), position: Value::Null, kind: NodeKind::Audit };
        Flow {
            id: FlowId::new("f1"),
            org_id: OrgId::new("o1"),
            zone_id: ZoneId::new("z1"),
            name: "sample".to_string(),
            enabled: true,
            version: 1,
            nodes: vec![trigger, audit],
            edges: vec![Edge { id: EdgeId::new("e1"), source: NodeId::new("n1"), target: NodeId::new("n2"), source_handle: None }],
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        }
    }

    #[tokio::test]
    async fn inspect_reports_no_error_when_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("flowgate.db");
        let store = SqliteRunStore::open(&SqliteStoreConfig::new(db_path.clone())).unwrap();
        let flow = sample_flow();
        store.upsert_flow(&flow).await.unwrap();
        let execution = FlowExecution::new(ExecutionId::new("e1"), flow.id.clone(), flow.version, EventId::new("evt1"), Value::Null, flowgate_core::ids::Mode::Test);
        store.save_execution(&execution).await.unwrap();

        assert!(inspect(&db_path, ExecutionStatus::Running).is_ok());
    }
}
