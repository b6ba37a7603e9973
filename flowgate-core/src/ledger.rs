// flowgate-core/src/ledger.rs
// ============================================================================
// Module: Flowgate Ledger Data Model
// Description: ApprovalLedgerEntry, double-entry transaction shapes, and the
//              approval continuation token wire format.
// Purpose: Share the approval ledger's data model between the runtime (which
//          produces entries) and flowgate-ledger (which signs, stores, and
//          verifies them), without either depending on the other's storage
//          concerns.
// Dependencies: crate::ids, crate::time, serde
// ============================================================================

//! ## Overview
//! This module defines shapes only; HMAC signing, canonical-string assembly,
//! and constant-time verification live in `flowgate-ledger`, which is the
//! only crate that holds the signing secret.

use serde::Deserialize;
use serde::Serialize;

use crate::ids::ExecutionId;
use crate::ids::FlowId;
use crate::ids::NodeId;
use crate::ids::OrgId;
use crate::ids::ZoneId;
use crate::time::Timestamp;

/// A recorded approval/rejection decision on an approval node (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalLedgerEntry {
    /// Execution the approval belongs to.
    pub execution_id: ExecutionId,
    /// Approval node within that execution.
    pub node_id: NodeId,
    /// Flow the execution belongs to.
    pub flow_id: FlowId,
    /// User who made the decision.
    pub approver_user_id: String,
    /// Role the approval node required.
    pub required_role: String,
    /// Whether the request was approved.
    pub approved: bool,
    /// Optional free-text reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the decision was recorded.
    pub timestamp: Timestamp,
    /// Hex-encoded HMAC-SHA256 signature over the canonical string.
    pub signature: String,
}

impl ApprovalLedgerEntry {
    /// Builds the canonical string this entry's signature covers:
    /// `execution_id|node_id|flow_id|approver_user_id|required_role|approved|timestamp`.
    #[must_use]
    pub fn canonical_string(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.execution_id,
            self.node_id,
            self.flow_id,
            self.approver_user_id,
            self.required_role,
            self.approved,
            self.timestamp,
        )
    }

    /// Returns the ledger transaction reference id this entry is anchored by.
    #[must_use]
    pub fn reference_id(&self) -> String {
        reference_id_for(&self.execution_id, &self.node_id)
    }
}

/// Derives the ledger transaction reference id for an approval decision.
#[must_use]
pub fn reference_id_for(execution_id: &ExecutionId, node_id: &NodeId) -> String {
    format!("approval_{execution_id}_{node_id}")
}

/// Well-known account names the approval ledger anchors transactions to.
pub mod accounts {
    /// Debited when an approval decision is recorded.
    pub const APPROVAL_PENDING: &str = "approval_pending";
    /// Credited when an approval decision is recorded.
    pub const APPROVAL_COMPLETED: &str = "approval_completed";
}

/// One side of a balanced double-entry transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntryLine {
    /// Account name.
    pub account: String,
    /// Signed amount; debits and credits within a transaction sum to zero.
    pub amount: i64,
    /// ISO 4217 currency code. Single currency per transaction.
    pub currency: String,
}

/// A request to record a balanced double-entry transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTransaction {
    /// Idempotency key; unique per transaction.
    pub reference_id: String,
    /// Human-readable description.
    pub description: String,
    /// Balanced entry lines; must sum to zero and share one currency.
    pub entries: Vec<LedgerEntryLine>,
    /// Zone the transaction belongs to.
    pub zone_id: ZoneId,
    /// Deployment mode (test/live) the transaction is scoped to.
    pub mode: crate::ids::Mode,
}

/// A request to provision a ledger account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    /// Account name, unique per zone/mode.
    pub name: String,
    /// Account type (e.g. `system`, `user`).
    pub account_type: String,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Owning user, for user-scoped accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Zone the account belongs to.
    pub zone_id: ZoneId,
    /// Deployment mode the account is scoped to.
    pub mode: crate::ids::Mode,
}

/// Out-of-band continuation token for an approval node (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalTokenClaims {
    /// Execution the token authorizes resuming.
    pub execution_id: ExecutionId,
    /// Node the token authorizes a decision on.
    pub node_id: NodeId,
    /// Role required to redeem the token.
    pub required_role: String,
    /// Organization the token is scoped to.
    pub org_id: OrgId,
    /// Expiry, after which the token MUST be rejected.
    pub expires_at: Timestamp,
}

/// Reasons an approval token may be rejected, distinguished for operator
/// diagnostics (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenRejection {
    /// The token's expiry has passed.
    #[error("approval token expired")]
    Expired,
    /// The HMAC tag did not verify, or the token was not valid base64/JSON.
    #[error("approval token signature invalid")]
    InvalidSignature,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "test-only assertions")]
    use super::*;

    #[test]
    fn canonical_string_field_order_matches_spec() {
        let entry = ApprovalLedgerEntry {
            execution_id: ExecutionId::new("ex1"),
            node_id: NodeId::new("n1"),
            flow_id: FlowId::new("f1"),
            approver_user_id: "u1".to_string(),
            required_role: "manager".to_string(),
            approved: true,
            reason: None,
            timestamp: Timestamp::parse("2026-01-01T00:00:00Z").expect("valid rfc3339"),
            signature: String::new(),
        };
        assert_eq!(
            entry.canonical_string(),
            "ex1|n1|f1|u1|manager|true|2026-01-01T00:00:00Z"
        );
    }

    #[test]
    fn reference_id_matches_spec_format() {
        assert_eq!(
            reference_id_for(&ExecutionId::new("ex1"), &NodeId::new("n1")),
            "approval_ex1_n1"
        );
    }

    proptest::proptest! {
        #[test]
        fn canonical_string_is_deterministic_and_carries_every_field(
            approver in "[a-zA-Z0-9_]{1,16}",
            role in "[a-zA-Z0-9_]{1,16}",
            approved in proptest::prelude::any::<bool>(),
        ) {
            let entry = ApprovalLedgerEntry {
                execution_id: ExecutionId::new("ex1"),
                node_id: NodeId::new("n1"),
                flow_id: FlowId::new("f1"),
                approver_user_id: approver.clone(),
                required_role: role.clone(),
                approved,
                reason: None,
                timestamp: Timestamp::parse("2026-01-01T00:00:00Z").expect("valid rfc3339"),
                signature: String::new(),
            };

            let first = entry.canonical_string();
            let second = entry.canonical_string();
            proptest::prop_assert_eq!(&first, &second);
            proptest::prop_assert_eq!(first.matches('|').count(), 6);
            proptest::prop_assert!(first.contains(&approver));
            proptest::prop_assert!(first.contains(&role));
            let approved_marker = format!("|{}|", approved);
            proptest::prop_assert!(first.contains(&approved_marker));
        }
    }
}
