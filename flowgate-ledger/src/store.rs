// flowgate-ledger/src/store.rs
// ============================================================================
// Module: SQLite Double-Entry Ledger
// Description: Durable LedgerClient backed by SQLite WAL.
// Purpose: Persist accounts, balanced transactions, and signed approval
//          decisions as an append-only log.
// Dependencies: flowgate-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! `accounts`, `transactions`, and `transaction_entries` are never updated or
//! deleted after insert; `CREATE TRIGGER` statements enforce that at the
//! `SQLite` level so a bug elsewhere in the process cannot rewrite ledger
//! history. `approval_entries` holds the signed [`ApprovalLedgerEntry`]
//! rows, one per `(execution_id, node_id)`, written atomically with the
//! anchoring transaction inside [`record_approval_decision`].

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use flowgate_core::ledger::ApprovalLedgerEntry;
use flowgate_core::ledger::CreateAccount;
use flowgate_core::ledger::RecordTransaction;
use flowgate_core::interfaces::LedgerClient;
use flowgate_core::interfaces::LedgerError;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use thiserror::Error;

const SCHEMA_VERSION: i64 = 1;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// `SQLite` ledger errors, before conversion to [`LedgerError`].
#[derive(Debug, Error)]
pub enum SqliteLedgerError {
    /// Store I/O or engine error.
    #[error("flowgate ledger db error: {0}")]
    Db(String),
    /// The transaction or account violated a ledger invariant.
    #[error("flowgate ledger invalid: {0}")]
    Invalid(String),
}

impl From<SqliteLedgerError> for LedgerError {
    fn from(error: SqliteLedgerError) -> Self {
        match error {
            SqliteLedgerError::Db(message) => Self::Unreachable(message),
            SqliteLedgerError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// `SQLite`-backed [`LedgerClient`].
#[derive(Clone)]
pub struct SqliteLedgerStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteLedgerStore {
    /// Opens (creating if necessary) a `SQLite`-backed ledger store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteLedgerError`] when the database cannot be opened or
    /// initialized.
    pub fn open(path: &Path) -> Result<Self, SqliteLedgerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
            }
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let mut connection = Connection::open_with_flags(path, flags).map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        connection
            .execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        connection
            .busy_timeout(std::time::Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
            .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        initialize_schema(&mut connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }
}

fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteLedgerError> {
    let tx = connection.transaction().map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS ledger_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM ledger_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    if version.is_none() {
        tx.execute("INSERT INTO ledger_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
            .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        tx.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                zone_id TEXT NOT NULL,
                mode TEXT NOT NULL,
                name TEXT NOT NULL,
                account_type TEXT NOT NULL,
                currency TEXT NOT NULL,
                user_id TEXT,
                PRIMARY KEY (zone_id, mode, name)
             );
             CREATE TABLE IF NOT EXISTS transactions (
                reference_id TEXT PRIMARY KEY,
                zone_id TEXT NOT NULL,
                mode TEXT NOT NULL,
                description TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS transaction_entries (
                reference_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                account TEXT NOT NULL,
                amount INTEGER NOT NULL,
                currency TEXT NOT NULL,
                PRIMARY KEY (reference_id, seq),
                FOREIGN KEY (reference_id) REFERENCES transactions(reference_id)
             );
             CREATE TABLE IF NOT EXISTS approval_entries (
                reference_id TEXT PRIMARY KEY,
                execution_id TEXT NOT NULL,
                node_id TEXT NOT NULL,
                entry_json BLOB NOT NULL
             );
             CREATE TRIGGER IF NOT EXISTS transactions_immutable_update
                BEFORE UPDATE ON transactions
                BEGIN SELECT RAISE(ABORT, 'transactions are append-only'); END;
             CREATE TRIGGER IF NOT EXISTS transactions_immutable_delete
                BEFORE DELETE ON transactions
                BEGIN SELECT RAISE(ABORT, 'transactions are append-only'); END;
             CREATE TRIGGER IF NOT EXISTS entries_immutable_update
                BEFORE UPDATE ON transaction_entries
                BEGIN SELECT RAISE(ABORT, 'transaction entries are append-only'); END;
             CREATE TRIGGER IF NOT EXISTS entries_immutable_delete
                BEFORE DELETE ON transaction_entries
                BEGIN SELECT RAISE(ABORT, 'transaction entries are append-only'); END;",
        )
        .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    }
    tx.commit().map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    Ok(())
}

fn insert_transaction(tx: &rusqlite::Transaction<'_>, transaction: &RecordTransaction) -> Result<(), SqliteLedgerError> {
    let sum: i64 = transaction.entries.iter().map(|line| line.amount).sum();
    if sum != 0 {
        return Err(SqliteLedgerError::Invalid(format!("unbalanced transaction {}: sum {sum}", transaction.reference_id)));
    }
    if transaction.entries.is_empty() {
        return Err(SqliteLedgerError::Invalid(format!("transaction {} has no entries", transaction.reference_id)));
    }
    let currency = &transaction.entries[0].currency;
    if transaction.entries.iter().any(|line| &line.currency != currency) {
        return Err(SqliteLedgerError::Invalid(format!("transaction {} mixes currencies", transaction.reference_id)));
    }
    let result = tx.execute(
        "INSERT INTO transactions (reference_id, zone_id, mode, description) VALUES (?1, ?2, ?3, ?4)",
        params![transaction.reference_id, transaction.zone_id.as_str(), transaction.mode.to_string(), transaction.description],
    );
    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
            return Err(SqliteLedgerError::Invalid(format!("reference id {} already recorded", transaction.reference_id)));
        }
        Err(err) => return Err(SqliteLedgerError::Db(err.to_string())),
    }
    for (seq, line) in transaction.entries.iter().enumerate() {
        let seq = i64::try_from(seq).unwrap_or(i64::MAX);
        tx.execute(
            "INSERT INTO transaction_entries (reference_id, seq, account, amount, currency) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![transaction.reference_id, seq, line.account, line.amount, line.currency],
        )
        .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
    }
    Ok(())
}

#[async_trait]
impl LedgerClient for SqliteLedgerStore {
    async fn create_account(&self, account: CreateAccount) -> Result<(), LedgerError> {
        let guard = self.connection.lock().map_err(|_| LedgerError::Unreachable("ledger mutex poisoned".to_string()))?;
        guard
            .execute(
                "INSERT INTO accounts (zone_id, mode, name, account_type, currency, user_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(zone_id, mode, name) DO NOTHING",
                params![account.zone_id.as_str(), account.mode.to_string(), account.name, account.account_type, account.currency, account.user_id],
            )
            .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        Ok(())
    }

    async fn record_transaction(&self, transaction: RecordTransaction) -> Result<(), LedgerError> {
        let mut guard = self.connection.lock().map_err(|_| LedgerError::Unreachable("ledger mutex poisoned".to_string()))?;
        let tx = guard.transaction().map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        insert_transaction(&tx, &transaction)?;
        tx.commit().map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        Ok(())
    }

    async fn record_approval_decision(&self, entry: ApprovalLedgerEntry, transaction: RecordTransaction) -> Result<(), LedgerError> {
        let entry_json = serde_json::to_vec(&entry).map_err(|err| SqliteLedgerError::Invalid(err.to_string()))?;
        let mut guard = self.connection.lock().map_err(|_| LedgerError::Unreachable("ledger mutex poisoned".to_string()))?;
        let tx = guard.transaction().map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        insert_transaction(&tx, &transaction)?;
        tx.execute(
            "INSERT INTO approval_entries (reference_id, execution_id, node_id, entry_json) VALUES (?1, ?2, ?3, ?4)",
            params![entry.reference_id(), entry.execution_id.as_str(), entry.node_id.as_str(), entry_json],
        )
        .map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        tx.commit().map_err(|err| SqliteLedgerError::Db(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test-only assertions")]
    use super::*;
    use flowgate_core::ids::ExecutionId;
    use flowgate_core::ids::FlowId;
    use flowgate_core::ids::Mode;
    use flowgate_core::ids::NodeId;
    use flowgate_core::ids::ZoneId;
    use flowgate_core::ledger::LedgerEntryLine;
    use flowgate_core::ledger::accounts;
    use flowgate_core::time::Timestamp;

    fn balanced_transaction(reference_id: &str) -> RecordTransaction {
        RecordTransaction {
            reference_id: reference_id.to_string(),
            description: "approval decision".to_string(),
            entries: vec![
                LedgerEntryLine { account: accounts::APPROVAL_PENDING.to_string(), amount: -1, currency: "USD".to_string() },
                LedgerEntryLine { account: accounts::APPROVAL_COMPLETED.to_string(), amount: 1, currency: "USD".to_string() },
            ],
            zone_id: ZoneId::new("z1"),
            mode: Mode::Test,
        }
    }

    #[tokio::test]
    async fn record_transaction_then_duplicate_reference_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteLedgerStore::open(&dir.path().join("ledger.db")).unwrap();
        store.record_transaction(balanced_transaction("ref1")).await.unwrap();
        let result = store.record_transaction(balanced_transaction("ref1")).await;
        assert!(matches!(result, Err(LedgerError::Invalid(_))));
    }

    #[tokio::test]
    async fn unbalanced_transaction_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteLedgerStore::open(&dir.path().join("ledger.db")).unwrap();
        let mut transaction = balanced_transaction("ref2");
        transaction.entries[1].amount = 2;
        let result = store.record_transaction(transaction).await;
        assert!(matches!(result, Err(LedgerError::Invalid(_))));
    }

    #[tokio::test]
    async fn record_approval_decision_persists_both_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteLedgerStore::open(&dir.path().join("ledger.db")).unwrap();
        let entry = ApprovalLedgerEntry {
            execution_id: ExecutionId::new("ex1"),
            node_id: NodeId::new("n1"),
            flow_id: FlowId::new("f1"),
            approver_user_id: "u1".to_string(),
            required_role: "manager".to_string(),
            approved: true,
            reason: None,
            timestamp: Timestamp::now(),
            signature: "deadbeef".to_string(),
        };
        let reference_id = entry.reference_id();
        store.record_approval_decision(entry, balanced_transaction(&reference_id)).await.unwrap();
        let result = store.record_transaction(balanced_transaction(&reference_id)).await;
        assert!(matches!(result, Err(LedgerError::Invalid(_))));
    }
}
