// flowgate-runtime/tests/worker_integration.rs
// ============================================================================
// Module: Runtime Worker Integration Tests
// Description: End-to-end trigger-match-to-completion tests against the
//              in-memory stream bus and a hand-rolled in-memory run store.
// ============================================================================

//! End-to-end trigger-match-to-completion tests against the in-memory
//! stream bus and a hand-rolled in-memory run store.
#![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]
#![allow(clippy::expect_used, reason = "Tests use expect for explicit failure messages.")]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use flowgate_bus::InMemoryStreamBus;
use flowgate_core::engine::FlowEngine;
use flowgate_core::event::EventEnvelope;
use flowgate_core::event::StreamEntry;
use flowgate_core::execution::ExecutionStatus;
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
use flowgate_core::ids::IdempotencyKey;
use flowgate_core::ids::Mode;
use flowgate_core::ids::NodeId;
use flowgate_core::ids::OrgId;
use flowgate_core::ids::ZoneId;
use flowgate_core::interfaces::LedgerClient;
use flowgate_core::interfaces::LedgerError;
use flowgate_core::interfaces::NoopAuditSink;
use flowgate_core::interfaces::RunStore;
use flowgate_core::ledger::ApprovalLedgerEntry;
use flowgate_core::ledger::CreateAccount;
use flowgate_core::ledger::RecordTransaction;
use flowgate_core::interfaces::StoreError;
use flowgate_core::interfaces::StreamBus;
use flowgate_core::time::Timestamp;
use flowgate_ledger::HmacApprovalSigner;
use flowgate_providers::build_default_registry;
use flowgate_runtime::Dispatcher;
use flowgate_runtime::Supervisor;
use flowgate_runtime::WorkerConfig;
use serde_json::Value;
use serde_json::json;

#[derive(Default)]
struct MemoryRunStore {
    flows: Mutex<HashMap<String, Flow>>,
    executions: Mutex<HashMap<String, FlowExecution>>,
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn load_flow(&self, flow_id: &FlowId) -> Result<Flow, StoreError> {
        self.flows.lock().unwrap().get(flow_id.as_str()).cloned().ok_or_else(|| StoreError::NotFound(flow_id.to_string()))
    }

    async fn enabled_flows_for_zone(&self, zone_id: &ZoneId) -> Result<Vec<Flow>, StoreError> {
        Ok(self.flows.lock().unwrap().values().filter(|flow| &flow.zone_id == zone_id && flow.enabled).cloned().collect())
    }

    async fn upsert_flow(&self, flow: &Flow) -> Result<(), StoreError> {
        self.flows.lock().unwrap().insert(flow.id.to_string(), flow.clone());
        Ok(())
    }

    async fn load_execution(&self, execution_id: &ExecutionId) -> Result<FlowExecution, StoreError> {
        self.executions.lock().unwrap().get(execution_id.as_str()).cloned().ok_or_else(|| StoreError::NotFound(execution_id.to_string()))
    }

    async fn save_execution(&self, execution: &FlowExecution) -> Result<(), StoreError> {
        self.executions.lock().unwrap().insert(execution.id.to_string(), execution.clone());
        Ok(())
    }
}

struct UnusedLedger;

#[async_trait]
impl LedgerClient for UnusedLedger {
    async fn create_account(&self, _account: CreateAccount) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn record_transaction(&self, _transaction: RecordTransaction) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn record_approval_decision(&self, _entry: ApprovalLedgerEntry, _transaction: RecordTransaction) -> Result<(), LedgerError> {
        Ok(())
    }
}

fn audit_only_flow(event_type: &str) -> Flow {
    Flow {
        id: FlowId::new("f1"),
        org_id: OrgId::new("org1"),
        zone_id: ZoneId::new("z1"),
        name: "audit-on-trigger".to_string(),
        enabled: true,
        version: 1,
        nodes: vec![
            Node { id: NodeId::new("trigger"), position: Value::Null, kind: NodeKind::Trigger(TriggerConfig { event_type: event_type.to_string() }) },
            Node { id: NodeId::new("audit"), position: Value::Null, kind: NodeKind::Audit },
        ],
        edges: vec![Edge { id: EdgeId::new("e1"), source: NodeId::new("trigger"), target: NodeId::new("audit"), source_handle: None }],
        created_at: Timestamp::now(),
        updated_at: Timestamp::now(),
    }
}

fn envelope(event_type: &str) -> EventEnvelope {
    EventEnvelope {
        id: EventId::new("evt1"),
        event_type: event_type.to_string(),
        zone_id: ZoneId::new("z1"),
        org_id: OrgId::new("org1"),
        mode: Mode::Test,
        timestamp: Timestamp::now(),
        idempotency_key: IdempotencyKey::new("idem1"),
        payload: json!({ "amount": 100 }),
        meta: std::collections::BTreeMap::new(),
    }
}

#[tokio::test]
async fn matched_trigger_runs_to_completion_and_acks() {
    let bus: Arc<dyn StreamBus> = Arc::new(InMemoryStreamBus::new());
    let run_store = Arc::new(MemoryRunStore::default());
    let flow = audit_only_flow("payment.created");
    run_store.upsert_flow(&flow).await.unwrap();

    let registry = build_default_registry(Arc::new(NoopAuditSink), false, None).unwrap();
    let engine = Arc::new(FlowEngine::new(registry, Arc::clone(&run_store), Arc::new(UnusedLedger), Arc::new(HmacApprovalSigner::new(b"secret".to_vec()))));
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&run_store), engine, Arc::new(NoopAuditSink), 4));

    let mut config = WorkerConfig::new("runtime", "worker-1");
    config.read_block = Duration::from_millis(50);
    config.rediscover_interval = Duration::from_millis(20);
    config.shutdown_drain = Duration::from_secs(1);

    let entry = envelope("payment.created");
    let topic = entry.topic().to_string();
    bus.append(&topic, StreamEntry::new(entry, 0)).await.unwrap();

    let handle = Supervisor::new(Arc::clone(&bus), dispatcher, Arc::new(NoopAuditSink), config).spawn();

    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.shutdown().await;

    let executions = run_store.executions.lock().unwrap();
    assert_eq!(executions.len(), 1);
    let execution = executions.values().next().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn unmatched_event_type_starts_no_execution() {
    let bus: Arc<dyn StreamBus> = Arc::new(InMemoryStreamBus::new());
    let run_store = Arc::new(MemoryRunStore::default());
    run_store.upsert_flow(&audit_only_flow("payment.created")).await.unwrap();

    let registry = build_default_registry(Arc::new(NoopAuditSink), false, None).unwrap();
    let engine = Arc::new(FlowEngine::new(registry, Arc::clone(&run_store), Arc::new(UnusedLedger), Arc::new(HmacApprovalSigner::new(b"secret".to_vec()))));
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&run_store), engine, Arc::new(NoopAuditSink), 4));

    let mut config = WorkerConfig::new("runtime", "worker-1");
    config.read_block = Duration::from_millis(50);
    config.rediscover_interval = Duration::from_millis(20);
    config.shutdown_drain = Duration::from_secs(1);

    let entry = envelope("payment.refunded");
    let topic = entry.topic().to_string();
    bus.append(&topic, StreamEntry::new(entry, 0)).await.unwrap();

    let handle = Supervisor::new(Arc::clone(&bus), dispatcher, Arc::new(NoopAuditSink), config).spawn();
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.shutdown().await;

    assert!(run_store.executions.lock().unwrap().is_empty());
}
