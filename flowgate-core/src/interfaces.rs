// flowgate-core/src/interfaces.rs
// ============================================================================
// Module: Flowgate Capability Interfaces
// Description: Async traits the runtime and gateway are generic over, plus
//              each trait's dedicated error enum.
// Purpose: Let flowgate-runtime/flowgate-gateway compose against in-memory,
//          SQLite-backed, or test-double implementations interchangeably.
// Dependencies: async-trait, crate::{ids, event, flow, execution, ledger},
//               thiserror
// ============================================================================

//! ## Overview
//! Every external collaborator the engine depends on — the stream bus, the
//! dedup store, the execution store, node handlers, the auth validator, the
//! ledger client, and the audit sink — is expressed as a trait here. Each
//! trait owns its error enum so a failure from one collaborator can never be
//! silently reinterpreted as a failure from another.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::event::EventEnvelope;
use crate::event::StreamEntry;
use crate::execution::FlowExecution;
use crate::execution::HandlerOutcome;
use crate::flow::Flow;
use crate::flow::Node;
use crate::ids::EventId;
use crate::ids::ExecutionId;
use crate::ids::FlowId;
use crate::ids::Mode;
use crate::ids::OrgId;
use crate::ids::UserId;
use crate::ids::ZoneId;
use crate::ledger::ApprovalLedgerEntry;
use crate::ledger::CreateAccount;
use crate::ledger::RecordTransaction;

// ============================================================================
// SECTION: Stream Bus (C1)
// ============================================================================

/// Errors raised by a [`StreamBus`] implementation.
#[derive(Debug, Error)]
pub enum BusError {
    /// The backing store is unreachable.
    #[error("stream bus unreachable: {0}")]
    Unreachable(String),
    /// The requested topic or group does not exist and cannot be created.
    #[error("stream bus rejected operation: {0}")]
    Rejected(String),
}

/// A batch entry read from a [`StreamBus`] consumer group.
#[derive(Debug, Clone)]
pub struct BusEntry {
    /// Opaque id assigned by the bus at append time.
    pub entry_id: String,
    /// The entry payload.
    pub entry: StreamEntry,
}

/// Append-only per-topic log with consumer-group delivery (spec §4.1).
#[async_trait]
pub trait StreamBus: Send + Sync {
    /// Appends `entry` to `topic`, returning its assigned id. Never blocks
    /// on the presence or absence of consumers.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the append cannot be durably recorded.
    async fn append(&self, topic: &str, entry: StreamEntry) -> Result<String, BusError>;

    /// Reads up to `max` entries for `consumer` within `group`, blocking for
    /// at most `block` before returning an empty batch.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the read cannot be serviced.
    async fn read(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        max: usize,
        block: std::time::Duration,
    ) -> Result<Vec<BusEntry>, BusError>;

    /// Acknowledges `entry_id`, removing it from the consumer's pending set.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the entry is unknown or already acked.
    async fn ack(&self, topic: &str, group: &str, entry_id: &str) -> Result<(), BusError>;

    /// Idempotently ensures `group` exists on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the group cannot be created.
    async fn ensure_group(&self, topic: &str, group: &str) -> Result<(), BusError>;

    /// Returns topic names matching `pattern` (e.g. `zone.*.event.*`).
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when discovery cannot be serviced.
    async fn discover(&self, pattern: &str) -> Result<Vec<String>, BusError>;
}

// ============================================================================
// SECTION: Dedup Store (C2)
// ============================================================================

/// Errors raised by a [`DedupStore`] implementation.
#[derive(Debug, Error)]
pub enum DedupError {
    /// The backing store is unreachable. Callers MUST fail closed on this
    /// variant rather than proceeding as if no duplicate existed.
    #[error("dedup store unreachable: {0}")]
    Unreachable(String),
}

/// Atomic `get_or_set` keyed cache used for ingestion deduplication (spec
/// §4.2).
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Returns the cached value for `key` if present.
    ///
    /// # Errors
    ///
    /// Returns [`DedupError`] on store failure; callers must fail closed.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DedupError>;

    /// Atomically sets `key` to `value` with the given TTL if absent,
    /// returning the winning value (either the new one or a concurrent
    /// writer's).
    ///
    /// # Errors
    ///
    /// Returns [`DedupError`] on store failure; callers must fail closed.
    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: std::time::Duration,
    ) -> Result<Vec<u8>, DedupError>;
}

// ============================================================================
// SECTION: Run Store (flows + executions)
// ============================================================================

/// Errors raised by a [`RunStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store is unreachable.
    #[error("run store unreachable: {0}")]
    Unreachable(String),
    /// The requested record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),
    /// A uniqueness or state-machine constraint was violated.
    #[error("store conflict: {0}")]
    Conflict(String),
}

/// Persistence for flows and their executions.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Loads a flow by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent, or
    /// [`StoreError::Unreachable`] on store failure.
    async fn load_flow(&self, flow_id: &FlowId) -> Result<Flow, StoreError>;

    /// Returns all enabled flows for `zone_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unreachable`] on store failure.
    async fn enabled_flows_for_zone(&self, zone_id: &ZoneId) -> Result<Vec<Flow>, StoreError>;

    /// Inserts a new flow revision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on store failure.
    async fn upsert_flow(&self, flow: &Flow) -> Result<(), StoreError>;

    /// Loads an execution by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent, or
    /// [`StoreError::Unreachable`] on store failure.
    async fn load_execution(&self, execution_id: &ExecutionId) -> Result<FlowExecution, StoreError>;

    /// Persists (creates or updates) an execution record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on store failure.
    async fn save_execution(&self, execution: &FlowExecution) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Node Handler
// ============================================================================

/// Execution context passed to every [`NodeHandler`] invocation.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// Zone the execution belongs to.
    pub zone_id: ZoneId,
    /// Organization the execution belongs to.
    pub org_id: OrgId,
    /// Execution id, for correlation in audit records and outbound calls.
    pub execution_id: ExecutionId,
}

/// A capability that executes one node type.
///
/// Mirrors the reference design's `execute(ctx, node, input) -> (output,
/// error | paused_sentinel)` (spec §4.4.3), but returns
/// [`HandlerOutcome`] instead of overloading the error channel for pauses.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Executes `node` against `input`, returning a [`HandlerOutcome`].
    ///
    /// This method itself is infallible at the Rust type level: handler
    /// failures are reported via `HandlerOutcome::Fail`, not `Result::Err`,
    /// so the registry never needs to distinguish "handler panicked" from
    /// "handler decided to fail the execution".
    async fn execute(&self, ctx: &HandlerContext, node: &Node, input: Value) -> HandlerOutcome;
}

// ============================================================================
// SECTION: Auth Validator
// ============================================================================

/// Errors raised while validating an API key.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The auth collaborator rejected the key outright.
    #[error("invalid api key")]
    Invalid,
    /// The auth collaborator is unreachable.
    #[error("auth validator unreachable: {0}")]
    Unreachable(String),
}

/// Key type resolved by auth validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// Secret key (`sk_*`); usable on all ingestion paths.
    Secret,
    /// Publishable key (`pk_*`); usable only on the emit path.
    Publishable,
}

/// The resolved identity and quota for a validated API key (spec §6).
#[derive(Debug, Clone)]
pub struct AuthResult {
    /// Whether the key is valid.
    pub valid: bool,
    /// Resolved user id.
    pub user_id: UserId,
    /// Resolved organization id.
    pub org_id: OrgId,
    /// Resolved zone id.
    pub zone_id: ZoneId,
    /// Resolved deployment mode.
    pub mode: Mode,
    /// Resolved role.
    pub role: String,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// Key type (`sk_*` vs `pk_*`).
    pub key_type: KeyType,
    /// Per-key requests-per-window quota.
    pub rate_limit_quota: u32,
}

/// Outbound RPC to the auth collaborator (spec §6).
#[async_trait]
pub trait AuthValidator: Send + Sync {
    /// Validates `key_hash` (`HMAC_SHA256(hmac_secret, raw_key)`, hex).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Invalid`] for a rejected key, or
    /// [`AuthError::Unreachable`] when the collaborator cannot be reached.
    async fn validate(&self, key_hash: &str) -> Result<AuthResult, AuthError>;
}

// ============================================================================
// SECTION: Ledger Client
// ============================================================================

/// Errors raised by the outbound ledger collaborator (spec §6).
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The transaction violated a ledger invariant (unbalanced entries,
    /// mixed currency, duplicate reference id).
    #[error("ledger rejected transaction: {0}")]
    Invalid(String),
    /// The ledger collaborator is unreachable.
    #[error("ledger unreachable: {0}")]
    Unreachable(String),
}

/// Outbound RPC to the ledger collaborator.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Provisions an account if it does not already exist.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] on collaborator failure.
    async fn create_account(&self, account: CreateAccount) -> Result<(), LedgerError>;

    /// Records a balanced double-entry transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Invalid`] when the transaction is unbalanced,
    /// mixes currencies, or reuses a reference id; [`LedgerError::Unreachable`]
    /// on collaborator failure.
    async fn record_transaction(&self, transaction: RecordTransaction) -> Result<(), LedgerError>;

    /// Atomically writes a signed approval decision alongside its anchoring
    /// transaction (spec §4.5 step 3-4: "the ledger transaction is atomic
    /// with the entry write").
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] on collaborator failure. Callers (the engine's
    /// Resume path) treat this as logged-but-non-fatal per spec §4.4.6 step
    /// 2b — the approval decision takes effect regardless.
    async fn record_approval_decision(
        &self,
        entry: ApprovalLedgerEntry,
        transaction: RecordTransaction,
    ) -> Result<(), LedgerError>;
}

// ============================================================================
// SECTION: Approval Signer
// ============================================================================

/// Signs and verifies [`crate::ledger::ApprovalLedgerEntry`] canonical
/// strings. The signing secret never leaves the implementing type, which is
/// how the engine records and later re-verifies decisions without holding
/// key material itself.
pub trait ApprovalSigner: Send + Sync {
    /// Returns the hex-encoded HMAC-SHA256 signature over `canonical_string`.
    fn sign(&self, canonical_string: &str) -> String;

    /// Verifies `signature` against `canonical_string` in constant time.
    fn verify(&self, canonical_string: &str, signature: &str) -> bool;
}

// ============================================================================
// SECTION: Audit Sink
// ============================================================================

/// A structured, serializable audit event.
pub trait AuditEvent: Serialize + Send + Sync {
    /// Stable event-type discriminator used by log aggregation.
    fn event_type(&self) -> &'static str;
}

/// Receives structured audit events emitted by the gateway, runtime, and
/// ledger. Flowgate has no `tracing`/`log` dependency; every ambient
/// observability signal is a typed event written through this trait.
pub trait AuditSink: Send + Sync {
    /// Records one audit event. Implementations MUST NOT panic; a sink that
    /// cannot deliver an event should drop it rather than abort the caller.
    fn record(&self, event: &dyn erased_audit::ErasedAuditEvent);
}

/// Object-safety helper: lets [`AuditSink::record`] take any concrete
/// [`AuditEvent`] without making the trait itself generic.
pub mod erased_audit {
    use serde_json::Value;

    use super::AuditEvent;

    /// Type-erased view of an [`AuditEvent`] for dynamic dispatch.
    pub trait ErasedAuditEvent {
        /// See [`AuditEvent::event_type`].
        fn event_type(&self) -> &'static str;
        /// Serializes the event to a JSON value for structured sinks.
        fn to_json(&self) -> Value;
    }

    impl<T: AuditEvent> ErasedAuditEvent for T {
        fn event_type(&self) -> &'static str {
            AuditEvent::event_type(self)
        }

        fn to_json(&self) -> Value {
            serde_json::to_value(self).unwrap_or(Value::Null)
        }
    }
}

/// An audit sink that writes nothing. Used in tests and in configurations
/// that route observability elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &dyn erased_audit::ErasedAuditEvent) {}
}

/// Marker type correlating an ingested event back to its envelope id, used
/// by handlers that need to reference the originating event without holding
/// the full envelope.
#[derive(Debug, Clone)]
pub struct TriggerRef {
    /// The event that triggered an execution.
    pub event_id: EventId,
    /// The envelope itself, for handlers that need the full payload.
    pub envelope: EventEnvelope,
}
