// flowgate-ledger/src/lib.rs
// ============================================================================
// Crate: flowgate-ledger
// Description: Approval ledger (C5): HMAC signing, continuation tokens, and
//              SQLite-backed double-entry storage.
// ============================================================================

//! Implements `flowgate_core::interfaces::ApprovalSigner` and
//! `flowgate_core::interfaces::LedgerClient`, plus the approval continuation
//! token format. This is the only crate in the workspace that holds HMAC
//! signing secret material.

pub mod signer;
pub mod store;
pub mod token;

pub use signer::HmacApprovalSigner;
pub use store::SqliteLedgerError;
pub use store::SqliteLedgerStore;
pub use token::mint_token;
pub use token::verify_token;
