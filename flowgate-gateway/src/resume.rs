// flowgate-gateway/src/resume.rs
// ============================================================================
// Module: Ingestion Gateway Resume Route
// Description: POST /executions/resume (spec §4.4.6, §6).
// Purpose: Authenticate a secret-keyed caller and drive a paused execution
//          forward through the flow engine.
// Dependencies: axum, flowgate-core
// ============================================================================

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use flowgate_core::engine::EngineError;
use flowgate_core::engine::EngineExecuteOutcome;
use flowgate_core::errors::ErrorKind;
use flowgate_core::errors::FlowgateError;
use flowgate_core::execution::ResumeRequest;
use flowgate_core::interfaces::ApprovalSigner;
use flowgate_core::interfaces::KeyType;
use flowgate_core::interfaces::LedgerClient;
use flowgate_core::interfaces::RunStore;
use serde::Serialize;

use crate::audit::RequestRejected;
use crate::audit::ResumeAccepted;
use crate::auth::hash_api_key;
use crate::http;
use crate::rate_limit::RETRY_AFTER_SECS;
use crate::rate_limit::RateLimitDecision;
use crate::state::GatewayState;

#[derive(Debug, Clone, Serialize)]
struct ResumeResponseBody {
    status: String,
}

/// Handles `POST /executions/resume`.
pub async fn handle_resume<St, L, Sig>(
    State(state): State<Arc<GatewayState<St, L, Sig>>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response
where
    St: RunStore,
    L: LedgerClient,
    Sig: ApprovalSigner,
{
    match run(&state, &headers, &body).await {
        Ok(response) => http::ok(&response),
        Err((err, retry_after)) => {
            state.audit.record(&RequestRejected { route: "resume", code: http::code_for(err.kind), reason: err.message.clone() });
            http::error_response(&err, retry_after)
        }
    }
}

async fn run<St, L, Sig>(
    state: &GatewayState<St, L, Sig>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<ResumeResponseBody, (FlowgateError, Option<u64>)>
where
    St: RunStore,
    L: LedgerClient,
    Sig: ApprovalSigner,
{
    if body.len() > state.config.max_body_bytes {
        return Err((FlowgateError::bad_request("request body exceeds the size limit"), None));
    }

    let raw_key = http::extract_api_key(headers)
        .ok_or_else(|| (FlowgateError::new(ErrorKind::Unauthorized, "missing api key"), None))?;
    let key_hash = hash_api_key(&state.config.api_key_hmac_secret, &raw_key);

    let auth_result = state.auth.validate(&key_hash).await.map_err(|err| match err {
        flowgate_core::interfaces::AuthError::Invalid => {
            (FlowgateError::new(ErrorKind::Unauthorized, "invalid api key"), None)
        }
        flowgate_core::interfaces::AuthError::Unreachable(msg) => {
            (FlowgateError::dependency(format!("auth collaborator unreachable: {msg}")), None)
        }
    })?;
    if !auth_result.valid {
        return Err((FlowgateError::new(ErrorKind::Unauthorized, "invalid api key"), None));
    }
    // Resume is not an ingestion path: publishable keys are rejected (spec
    // §4.3 "Secret keys are allowed on all ingestion paths; publishable
    // keys are allowed only on the emit path").
    if auth_result.key_type != KeyType::Secret {
        return Err((FlowgateError::new(ErrorKind::Forbidden, "resume requires a secret key"), None));
    }
    if !auth_result.scopes.iter().any(|scope| scope == "executions:resume") {
        return Err((FlowgateError::new(ErrorKind::Forbidden, "key lacks executions:resume scope"), None));
    }

    match state.rate_limiter.check(&key_hash, auth_result.rate_limit_quota) {
        RateLimitDecision::Allow => {}
        RateLimitDecision::Limited => {
            return Err((FlowgateError::new(ErrorKind::RateLimited, "rate limit exceeded"), Some(RETRY_AFTER_SECS)));
        }
    }

    let request: ResumeRequest = serde_json::from_slice(body)
        .map_err(|err| (FlowgateError::bad_request(format!("malformed request body: {err}")), None))?;

    let execution = state
        .run_store
        .load_execution(&request.execution_id)
        .await
        .map_err(|err| (FlowgateError::from(EngineError::from(err)), None))?;
    let flow = state
        .run_store
        .load_flow(&execution.flow_id)
        .await
        .map_err(|err| (FlowgateError::from(EngineError::from(err)), None))?;

    // A test-mode key must never resume (and so never write ledger entries
    // for) a live execution, and vice versa (spec.md:278 "test traffic
    // never touches live ledgers").
    if auth_result.mode != execution.mode {
        return Err((FlowgateError::new(ErrorKind::Forbidden, "key mode does not match execution mode"), None));
    }

    let outcome = state.engine.resume(&flow, request).await.map_err(|err| (FlowgateError::from(err), None))?;
    let (execution_id, status) = match &outcome {
        EngineExecuteOutcome::Completed(exec) => (exec.id.to_string(), "completed"),
        EngineExecuteOutcome::Paused(exec) => (exec.id.to_string(), "paused"),
        EngineExecuteOutcome::Failed(exec) => (exec.id.to_string(), "failed"),
    };
    state.audit.record(&ResumeAccepted { execution_id, status: status.to_string() });
    Ok(ResumeResponseBody { status: status.to_string() })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test-only assertions")]
    use std::sync::Arc;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use flowgate_core::engine::FlowEngine;
    use flowgate_core::engine::HandlerRegistry;
    use flowgate_core::errors::ErrorKind;
    use flowgate_core::execution::ExecutionStatus;
    use flowgate_core::execution::FlowExecution;
    use flowgate_core::flow::Flow;
    use flowgate_core::flow::Node;
    use flowgate_core::flow::NodeKind;
    use flowgate_core::flow::TriggerConfig;
    use flowgate_core::ids::EventId;
    use flowgate_core::ids::ExecutionId;
    use flowgate_core::ids::FlowId;
    use flowgate_core::ids::Mode;
    use flowgate_core::ids::NodeId;
    use flowgate_core::ids::OrgId;
    use flowgate_core::ids::UserId;
    use flowgate_core::ids::ZoneId;
    use flowgate_core::interfaces::AuthError;
    use flowgate_core::interfaces::AuthResult;
    use flowgate_core::interfaces::AuthValidator;
    use flowgate_core::interfaces::KeyType;
    use flowgate_core::interfaces::LedgerError;
    use flowgate_core::interfaces::NoopAuditSink;
    use flowgate_core::interfaces::StoreError;
    use flowgate_core::ledger::ApprovalLedgerEntry;
    use flowgate_core::ledger::CreateAccount;
    use flowgate_core::ledger::RecordTransaction;
    use flowgate_core::time::Timestamp;
    use serde_json::Value;

    use super::*;
    use crate::state::GatewayConfig;

    struct StubAuth;

    #[async_trait]
    impl AuthValidator for StubAuth {
        async fn validate(&self, _key_hash: &str) -> Result<AuthResult, AuthError> {
            Ok(AuthResult {
                valid: true,
                user_id: UserId::new("u1"),
                org_id: OrgId::new("o1"),
                zone_id: ZoneId::new("z1"),
                mode: Mode::Test,
                role: "admin".to_string(),
                scopes: vec!["executions:resume".to_string()],
                key_type: KeyType::Secret,
                rate_limit_quota: 1000,
            })
        }
    }

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
            edges: Vec::new(),
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        }
    }

    fn paused_execution(flow: &Flow, mode: Mode) -> FlowExecution {
        let mut execution = FlowExecution::new(ExecutionId::new("e1"), flow.id.clone(), flow.version, EventId::new("evt1"), Value::Null, mode);
        execution.start().unwrap();
        execution.pause_at(NodeId::new("n2")).unwrap();
        execution
    }

    struct RecordingStore {
        flow: Flow,
        execution: Mutex<FlowExecution>,
    }

    #[async_trait]
    impl RunStore for RecordingStore {
        async fn load_flow(&self, flow_id: &FlowId) -> Result<Flow, StoreError> {
            if *flow_id == self.flow.id {
                Ok(self.flow.clone())
            } else {
                Err(StoreError::NotFound(flow_id.to_string()))
            }
        }

        async fn enabled_flows_for_zone(&self, _zone_id: &ZoneId) -> Result<Vec<Flow>, StoreError> {
            Ok(vec![self.flow.clone()])
        }

        async fn upsert_flow(&self, _flow: &Flow) -> Result<(), StoreError> {
            Ok(())
        }

        async fn load_execution(&self, execution_id: &ExecutionId) -> Result<FlowExecution, StoreError> {
            let execution = self.execution.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if execution.id == *execution_id {
                Ok(execution.clone())
            } else {
                Err(StoreError::NotFound(execution_id.to_string()))
            }
        }

        async fn save_execution(&self, execution: &FlowExecution) -> Result<(), StoreError> {
            *self.execution.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = execution.clone();
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

        async fn record_approval_decision(
            &self,
            _entry: ApprovalLedgerEntry,
            _transaction: RecordTransaction,
        ) -> Result<(), LedgerError> {
            Ok(())
        }
    }

    struct UnusedSigner;

    impl ApprovalSigner for UnusedSigner {
        fn sign(&self, _canonical_string: &str) -> String {
            String::new()
        }

        fn verify(&self, _canonical_string: &str, _signature: &str) -> bool {
            false
        }
    }

    fn test_state(flow: Flow, execution: FlowExecution) -> GatewayState<RecordingStore, UnusedLedger, UnusedSigner> {
        let store = Arc::new(RecordingStore { flow, execution: Mutex::new(execution) });
        let ledger = Arc::new(UnusedLedger);
        let signer = Arc::new(UnusedSigner);
        let engine = Arc::new(FlowEngine::new(HandlerRegistry::new(), store.clone(), ledger, signer));
        GatewayState::new(
            Arc::new(flowgate_bus::InMemoryStreamBus::new()),
            Arc::new(flowgate_bus::InMemoryDedupStore::new()),
            Arc::new(StubAuth),
            store,
            engine,
            Arc::new(NoopAuditSink),
            GatewayConfig::new(b"secret".to_vec()),
        )
    }

    fn auth_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer sk_live_test".parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn resume_with_no_successors_completes_the_execution() {
        let flow = sample_flow();
        let execution = paused_execution(&flow, Mode::Test);
        let state = test_state(flow, execution);
        let headers = auth_headers();
        let body = br#"{"execution_id":"e1"}"#;

        let response = run(&state, &headers, body).await.unwrap();
        assert_eq!(response.status, "completed");
        assert_eq!(state.run_store.load_execution(&ExecutionId::new("e1")).await.unwrap().status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn missing_api_key_is_unauthorized() {
        let flow = sample_flow();
        let execution = paused_execution(&flow, Mode::Test);
        let state = test_state(flow, execution);
        let headers = HeaderMap::new();
        let err = run(&state, &headers, b"{}").await.unwrap_err();
        assert_eq!(err.0.kind, ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn live_execution_rejects_a_test_mode_key() {
        let flow = sample_flow();
        let execution = paused_execution(&flow, Mode::Live);
        let state = test_state(flow, execution);
        let headers = auth_headers();
        let body = br#"{"execution_id":"e1"}"#;

        let err = run(&state, &headers, body).await.unwrap_err();
        assert_eq!(err.0.kind, ErrorKind::Forbidden);
        assert_eq!(state.run_store.load_execution(&ExecutionId::new("e1")).await.unwrap().status, ExecutionStatus::Paused);
    }

    #[tokio::test]
    async fn unknown_execution_id_is_reported_as_an_error() {
        let flow = sample_flow();
        let execution = paused_execution(&flow, Mode::Test);
        let state = test_state(flow, execution);
        let headers = auth_headers();
        let body = br#"{"execution_id":"does-not-exist"}"#;
        assert!(run(&state, &headers, body).await.is_err());
    }
}
