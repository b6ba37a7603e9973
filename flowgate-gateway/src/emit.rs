// flowgate-gateway/src/emit.rs
// ============================================================================
// Module: Ingestion Gateway Emit Route
// Description: POST /v1/events/emit (spec §4.3).
// Purpose: Authenticate, rate-limit, dedup-check, and publish an inbound
//          business event to the stream bus.
// Dependencies: axum, flowgate-core
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use flowgate_core::errors::ErrorKind;
use flowgate_core::errors::FlowgateError;
use flowgate_core::event::EventEnvelope;
use flowgate_core::event::StreamEntry;
use flowgate_core::hashing::canonical_json_bytes;
use flowgate_core::hashing::short_payload_hash_hex;
use flowgate_core::ids::EventId;
use flowgate_core::ids::IdempotencyKey;
use flowgate_core::interfaces::ApprovalSigner;
use flowgate_core::interfaces::LedgerClient;
use flowgate_core::interfaces::RunStore;
use flowgate_core::time::Timestamp;
use flowgate_core::time::monotonic_unix_nanos;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::audit::IngestAccepted;
use crate::audit::IngestDuplicate;
use crate::audit::RequestRejected;
use crate::auth::hash_api_key;
use crate::http;
use crate::rate_limit::RETRY_AFTER_SECS;
use crate::rate_limit::RateLimitDecision;
use crate::state::GatewayState;
use crate::state::INGEST_DEDUP_TTL;

#[derive(Debug, Deserialize)]
struct EmitRequestBody {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    idempotency_key: Option<String>,
    data: Value,
    #[serde(default)]
    meta: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmitResponseBody {
    status: String,
    event_id: String,
    topic: String,
}

/// Handles `POST /v1/events/emit`.
pub async fn handle_emit<St, L, Sig>(
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
        Ok(response) => http::accepted(&response),
        Err((err, retry_after)) => {
            state.audit.record(&RequestRejected { route: "emit", code: http::code_for(err.kind), reason: err.message.clone() });
            http::error_response(&err, retry_after)
        }
    }
}

async fn run<St, L, Sig>(
    state: &GatewayState<St, L, Sig>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<EmitResponseBody, (FlowgateError, Option<u64>)>
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
    if !auth_result.scopes.iter().any(|scope| scope == "events:emit") {
        return Err((FlowgateError::new(ErrorKind::Forbidden, "key lacks events:emit scope"), None));
    }

    match state.rate_limiter.check(&key_hash, auth_result.rate_limit_quota) {
        RateLimitDecision::Allow => {}
        RateLimitDecision::Limited => {
            return Err((FlowgateError::new(ErrorKind::RateLimited, "rate limit exceeded"), Some(RETRY_AFTER_SECS)));
        }
    }

    let request: EmitRequestBody = serde_json::from_slice(body)
        .map_err(|err| (FlowgateError::bad_request(format!("malformed request body: {err}")), None))?;

    let zone_id = auth_result.zone_id.clone();
    if zone_id.is_empty() || request.event_type.is_empty() {
        return Err((FlowgateError::bad_request("zone and type are required"), None));
    }

    let idempotency_key = http::extract_idempotency_key_header(headers)
        .filter(|k| !k.is_empty())
        .or_else(|| request.idempotency_key.clone().filter(|k| !k.is_empty()))
        .unwrap_or_else(|| format!("auto_{}", monotonic_unix_nanos()));

    let dedup_key = format!("dedup:{zone_id}:{idempotency_key}");
    let cached = state
        .dedup
        .get(&dedup_key)
        .await
        .map_err(|err| (FlowgateError::dependency(format!("dedup store unreachable: {err}")), None))?;
    if let Some(bytes) = cached {
        let cached_response: EmitResponseBody = serde_json::from_slice(&bytes)
            .map_err(|err| (FlowgateError::internal(format!("corrupt dedup cache entry: {err}")), None))?;
        state.audit.record(&IngestDuplicate { event_id: cached_response.event_id.clone(), zone_id: zone_id.to_string() });
        return Ok(EmitResponseBody { status: "duplicate".to_string(), ..cached_response });
    }

    let payload_bytes = canonical_json_bytes(&request.data)
        .map_err(|err| (FlowgateError::internal(format!("failed to canonicalize payload: {err}")), None))?;
    let payload_hash = short_payload_hash_hex(&payload_bytes);
    let mut meta = request.meta.unwrap_or_default();
    meta.insert("payload_hash".to_string(), payload_hash);

    let timestamp = Timestamp::now();
    let envelope = EventEnvelope {
        id: EventId::new(format!("evt_{}", monotonic_unix_nanos())),
        event_type: request.event_type,
        zone_id: zone_id.clone(),
        org_id: auth_result.org_id.clone(),
        mode: auth_result.mode,
        timestamp,
        idempotency_key: IdempotencyKey::new(idempotency_key),
        payload: request.data,
        meta,
    };
    let topic = envelope.topic();
    let entry = StreamEntry::new(envelope.clone(), timestamp.as_offset_date_time().unix_timestamp());

    state
        .bus
        .append(topic.as_str(), entry)
        .await
        .map_err(|err| (FlowgateError::internal(format!("publish failed: {err}")), None))?;

    let response = EmitResponseBody { status: "ingested".to_string(), event_id: envelope.id.to_string(), topic: topic.to_string() };
    let cache_bytes = serde_json::to_vec(&response)
        .map_err(|err| (FlowgateError::internal(format!("failed to serialize response: {err}")), None))?;
    let _ = state
        .dedup
        .set_if_absent(&dedup_key, cache_bytes, INGEST_DEDUP_TTL)
        .await
        .map_err(|err| (FlowgateError::dependency(format!("dedup store unreachable: {err}")), None))?;

    state.audit.record(&IngestAccepted {
        event_id: response.event_id.clone(),
        zone_id: zone_id.to_string(),
        event_type: envelope.event_type.clone(),
        topic: topic.to_string(),
    });
    Ok(response)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test-only assertions")]
    use std::sync::Arc;

    use async_trait::async_trait;
    use flowgate_bus::InMemoryDedupStore;
    use flowgate_bus::InMemoryStreamBus;
    use flowgate_core::engine::FlowEngine;
    use flowgate_core::engine::HandlerRegistry;
    use flowgate_core::errors::ErrorKind;
    use flowgate_core::execution::FlowExecution;
    use flowgate_core::flow::Flow;
    use flowgate_core::ids::ExecutionId;
    use flowgate_core::ids::FlowId;
    use flowgate_core::ids::Mode;
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
                scopes: vec!["events:emit".to_string(), "executions:resume".to_string()],
                key_type: KeyType::Secret,
                rate_limit_quota: 1000,
            })
        }
    }

    struct UnusedStore;

    #[async_trait]
    impl RunStore for UnusedStore {
        async fn load_flow(&self, _flow_id: &FlowId) -> Result<Flow, StoreError> {
            Err(StoreError::NotFound("unused in emit tests".to_string()))
        }

        async fn enabled_flows_for_zone(&self, _zone_id: &ZoneId) -> Result<Vec<Flow>, StoreError> {
            Ok(Vec::new())
        }

        async fn upsert_flow(&self, _flow: &Flow) -> Result<(), StoreError> {
            Ok(())
        }

        async fn load_execution(&self, _execution_id: &ExecutionId) -> Result<FlowExecution, StoreError> {
            Err(StoreError::NotFound("unused in emit tests".to_string()))
        }

        async fn save_execution(&self, _execution: &FlowExecution) -> Result<(), StoreError> {
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

    fn test_state() -> GatewayState<UnusedStore, UnusedLedger, UnusedSigner> {
        let store = Arc::new(UnusedStore);
        let ledger = Arc::new(UnusedLedger);
        let signer = Arc::new(UnusedSigner);
        let engine = Arc::new(FlowEngine::new(HandlerRegistry::new(), store.clone(), ledger, signer));
        GatewayState::new(
            Arc::new(InMemoryStreamBus::new()),
            Arc::new(InMemoryDedupStore::new()),
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
    async fn ingest_then_duplicate_returns_cached_event_id() {
        let state = test_state();
        let headers = auth_headers();
        let body = br#"{"type":"order.created","idempotency_key":"k1","data":{"amount":100}}"#;

        let first = run(&state, &headers, body).await.unwrap();
        assert_eq!(first.status, "ingested");
        assert_eq!(first.topic, "zone.z1.event.order.created");

        let second = run(&state, &headers, body).await.unwrap();
        assert_eq!(second.status, "duplicate");
        assert_eq!(second.event_id, first.event_id);
    }

    #[tokio::test]
    async fn missing_api_key_is_unauthorized() {
        let state = test_state();
        let headers = HeaderMap::new();
        let err = run(&state, &headers, b"{}").await.unwrap_err();
        assert_eq!(err.0.kind, ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn empty_event_type_is_bad_request() {
        let state = test_state();
        let headers = auth_headers();
        let body = br#"{"type":"","data":{}}"#;
        let err = run(&state, &headers, body).await.unwrap_err();
        assert_eq!(err.0.kind, ErrorKind::BadRequest);
    }
}
