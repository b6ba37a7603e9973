// flowgate-store/src/store.rs
// ============================================================================
// Module: SQLite Run Store
// Description: Durable RunStore backed by SQLite WAL.
// Purpose: Persist flow definitions and flow executions.
// Dependencies: flowgate-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Flows are stored as a single current row per flow id; each `upsert_flow`
//! call increments `version` and overwrites the definition. Executions are
//! stored as one row per execution id, overwritten in place on every
//! `save_execution` call — there is no execution history table, only the
//! current snapshot, since spec-level consumers only ever need "what is this
//! execution's state right now".

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use flowgate_core::flow::Flow;
use flowgate_core::execution::FlowExecution;
use flowgate_core::ids::ExecutionId;
use flowgate_core::ids::FlowId;
use flowgate_core::ids::ZoneId;
use flowgate_core::interfaces::RunStore;
use flowgate_core::interfaces::StoreError;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

const SCHEMA_VERSION: i64 = 1;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors, before conversion to the crate-agnostic
/// [`StoreError`].
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("flowgate store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("flowgate store db error: {0}")]
    Db(String),
    /// Stored row failed to deserialize or violated an expected invariant.
    #[error("flowgate store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => {
                Self::Unreachable(message)
            }
            SqliteStoreError::Invalid(message) => Self::Conflict(message),
        }
    }
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the `SQLite` run store.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Builds a config pointing at `path` with the default busy timeout.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed [`RunStore`] with WAL journaling.
#[derive(Clone)]
pub struct SqliteRunStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRunStore {
    /// Opens (creating if necessary) a `SQLite`-backed run store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    /// Lists every execution currently recorded with `status`, for operator
    /// inspection of executions a crashed worker left stranded. Synchronous
    /// and outside the [`RunStore`] trait since it's a debugging aid, not a
    /// hot-path operation.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] on store failure or malformed rows.
    pub fn list_executions_by_status(&self, status: flowgate_core::execution::ExecutionStatus) -> Result<Vec<FlowExecution>, SqliteStoreError> {
        let encoded = serde_json::to_string(&status).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let guard = self.connection.lock().map_err(|_| SqliteStoreError::Db("store mutex poisoned".to_string()))?;
        let mut statement = guard
            .prepare("SELECT state_json FROM flow_executions WHERE status = ?1")
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = statement.query_map(params![encoded], |row| row.get::<_, Vec<u8>>(0)).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let mut executions = Vec::new();
        for row in rows {
            let bytes = row.map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let execution: FlowExecution = serde_json::from_slice(&bytes).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            executions.push(execution);
        }
        Ok(executions)
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        }
    }
    Ok(())
}

fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(connection)
}

fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    if version.is_none() {
        tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS flows (
                id TEXT PRIMARY KEY,
                org_id TEXT NOT NULL,
                zone_id TEXT NOT NULL,
                enabled INTEGER NOT NULL,
                version INTEGER NOT NULL,
                definition_json BLOB NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_flows_zone_enabled ON flows (zone_id, enabled);
             CREATE TABLE IF NOT EXISTS flow_executions (
                id TEXT PRIMARY KEY,
                flow_id TEXT NOT NULL,
                status TEXT NOT NULL,
                state_json BLOB NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_executions_flow ON flow_executions (flow_id);",
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn load_flow(&self, flow_id: &FlowId) -> Result<Flow, StoreError> {
        let guard = self.connection.lock().map_err(|_| StoreError::Unreachable("store mutex poisoned".to_string()))?;
        let row: Option<Vec<u8>> = guard
            .query_row("SELECT definition_json FROM flows WHERE id = ?1", params![flow_id.as_str()], |row| row.get(0))
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        let Some(bytes) = row else {
            return Err(StoreError::NotFound(format!("flow {flow_id}")));
        };
        serde_json::from_slice(&bytes).map_err(|err| SqliteStoreError::Invalid(err.to_string()).into())
    }

    async fn enabled_flows_for_zone(&self, zone_id: &ZoneId) -> Result<Vec<Flow>, StoreError> {
        let guard = self.connection.lock().map_err(|_| StoreError::Unreachable("store mutex poisoned".to_string()))?;
        let mut statement = guard
            .prepare("SELECT definition_json FROM flows WHERE zone_id = ?1 AND enabled = 1")
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let rows = statement
            .query_map(params![zone_id.as_str()], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let mut flows = Vec::new();
        for row in rows {
            let bytes = row.map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let flow: Flow = serde_json::from_slice(&bytes).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            flows.push(flow);
        }
        Ok(flows)
    }

    async fn upsert_flow(&self, flow: &Flow) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(flow).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let guard = self.connection.lock().map_err(|_| StoreError::Unreachable("store mutex poisoned".to_string()))?;
        guard
            .execute(
                "INSERT INTO flows (id, org_id, zone_id, enabled, version, definition_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    org_id = excluded.org_id,
                    zone_id = excluded.zone_id,
                    enabled = excluded.enabled,
                    version = excluded.version,
                    definition_json = excluded.definition_json",
                params![
                    flow.id.as_str(),
                    flow.org_id.as_str(),
                    flow.zone_id.as_str(),
                    i64::from(flow.enabled),
                    i64::try_from(flow.version).unwrap_or(i64::MAX),
                    bytes,
                ],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(())
    }

    async fn load_execution(&self, execution_id: &ExecutionId) -> Result<FlowExecution, StoreError> {
        let guard = self.connection.lock().map_err(|_| StoreError::Unreachable("store mutex poisoned".to_string()))?;
        let row: Option<Vec<u8>> = guard
            .query_row(
                "SELECT state_json FROM flow_executions WHERE id = ?1",
                params![execution_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        drop(guard);
        let Some(bytes) = row else {
            return Err(StoreError::NotFound(format!("execution {execution_id}")));
        };
        serde_json::from_slice(&bytes).map_err(|err| SqliteStoreError::Invalid(err.to_string()).into())
    }

    async fn save_execution(&self, execution: &FlowExecution) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(execution).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let status = serde_json::to_string(&execution.status).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let guard = self.connection.lock().map_err(|_| StoreError::Unreachable("store mutex poisoned".to_string()))?;
        guard
            .execute(
                "INSERT INTO flow_executions (id, flow_id, status, state_json)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    state_json = excluded.state_json",
                params![execution.id.as_str(), execution.flow_id.as_str(), status, bytes],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test-only assertions")]
    use super::*;
    use flowgate_core::flow::Edge;
    use flowgate_core::flow::Node;
    use flowgate_core::flow::NodeKind;
    use flowgate_core::flow::TriggerConfig;
    use flowgate_core::ids::EdgeId;
    use flowgate_core::ids::NodeId;
    use flowgate_core::ids::OrgId;
    use flowgate_core::time::Timestamp;
    use serde_json::Value;

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
    async fn upsert_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteRunStore::open(&SqliteStoreConfig::new(dir.path().join("flowgate.db"))).unwrap();
        let flow = sample_flow();
        store.upsert_flow(&flow).await.unwrap();
        let loaded = store.load_flow(&flow.id).await.unwrap();
        assert_eq!(loaded.id, flow.id);
        assert_eq!(loaded.nodes.len(), 2);
    }

    #[tokio::test]
    async fn enabled_flows_for_zone_filters_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteRunStore::open(&SqliteStoreConfig::new(dir.path().join("flowgate.db"))).unwrap();
        let mut flow = sample_flow();
        store.upsert_flow(&flow).await.unwrap();
        let mut disabled = sample_flow();
        disabled.id = FlowId::new("f2");
        disabled.enabled = false;
        store.upsert_flow(&disabled).await.unwrap();
        let found = store.enabled_flows_for_zone(&flow.zone_id).await.unwrap();
        assert_eq!(found.len(), 1);
        flow.version = 2;
        store.upsert_flow(&flow).await.unwrap();
        let reloaded = store.load_flow(&flow.id).await.unwrap();
        assert_eq!(reloaded.version, 2);
    }

    #[tokio::test]
    async fn list_executions_by_status_filters_to_requested_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteRunStore::open(&SqliteStoreConfig::new(dir.path().join("flowgate.db"))).unwrap();
        let flow = sample_flow();

        let mut running = FlowExecution::new(ExecutionId::new("e1"), flow.id.clone(), flow.version, flowgate_core::ids::EventId::new("evt1"), Value::Null, flowgate_core::ids::Mode::Test);
        running.start().unwrap();
        let pending = FlowExecution::new(ExecutionId::new("e2"), flow.id.clone(), flow.version, flowgate_core::ids::EventId::new("evt2"), Value::Null, flowgate_core::ids::Mode::Test);

        store.save_execution(&running).await.unwrap();
        store.save_execution(&pending).await.unwrap();

        let found = store.list_executions_by_status(flowgate_core::execution::ExecutionStatus::Running).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, running.id);
    }

    #[tokio::test]
    async fn load_execution_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteRunStore::open(&SqliteStoreConfig::new(dir.path().join("flowgate.db"))).unwrap();
        let result = store.load_execution(&ExecutionId::new("missing")).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
