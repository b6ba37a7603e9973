// flowgate-ledger/src/signer.rs
// ============================================================================
// Module: Approval Signer
// Description: HMAC-SHA256 signing and constant-time verification.
// Purpose: Implement flowgate_core::interfaces::ApprovalSigner; this module
//          is the only place in the workspace that holds signing secret
//          material.
// Dependencies: hmac, sha2, subtle, flowgate-core
// ============================================================================

//! ## Overview
//! Signatures are hex-encoded HMAC-SHA256 tags over the canonical string the
//! caller supplies (see `flowgate_core::ledger::ApprovalLedgerEntry::canonical_string`
//! and the approval token's own canonical form). Verification decodes the
//! provided tag and compares it to a freshly computed one using
//! [`subtle::ConstantTimeEq`] so a mismatched signature cannot be
//! distinguished by timing.

use flowgate_core::interfaces::ApprovalSigner;
use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256-backed [`ApprovalSigner`].
pub struct HmacApprovalSigner {
    secret: Vec<u8>,
}

impl HmacApprovalSigner {
    /// Builds a signer from raw secret bytes.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    /// Computes the raw HMAC tag over `canonical_string`. HMAC accepts keys
    /// of any length, so this only fails if the `hmac` crate's internal
    /// invariants change; callers treat a failure as "no valid signature".
    fn tag(&self, canonical_string: &str) -> Option<Vec<u8>> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret).ok()?;
        mac.update(canonical_string.as_bytes());
        Some(mac.finalize().into_bytes().to_vec())
    }
}

impl ApprovalSigner for HmacApprovalSigner {
    fn sign(&self, canonical_string: &str) -> String {
        self.tag(canonical_string).map(|bytes| flowgate_core::hashing::hex_encode(&bytes)).unwrap_or_default()
    }

    fn verify(&self, canonical_string: &str, signature: &str) -> bool {
        let Ok(provided) = decode_hex(signature) else {
            return false;
        };
        let Some(expected) = self.tag(canonical_string) else {
            return false;
        };
        if provided.len() != expected.len() {
            return false;
        }
        provided.ct_eq(&expected).into()
    }
}

fn decode_hex(value: &str) -> Result<Vec<u8>, ()> {
    if value.len() % 2 != 0 {
        return Err(());
    }
    let mut out = Vec::with_capacity(value.len() / 2);
    let bytes = value.as_bytes();
    for chunk in bytes.chunks(2) {
        let high = (chunk[0] as char).to_digit(16).ok_or(())?;
        let low = (chunk[1] as char).to_digit(16).ok_or(())?;
        out.push(((high << 4) | low) as u8);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test-only assertions")]
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let signer = HmacApprovalSigner::new(b"test-secret".to_vec());
        let signature = signer.sign("a|b|c");
        assert!(signer.verify("a|b|c", &signature));
    }

    #[test]
    fn tampered_input_fails_verification() {
        let signer = HmacApprovalSigner::new(b"test-secret".to_vec());
        let signature = signer.sign("a|b|c");
        assert!(!signer.verify("a|b|d", &signature));
    }

    #[test]
    fn malformed_signature_is_rejected_not_panicking() {
        let signer = HmacApprovalSigner::new(b"test-secret".to_vec());
        assert!(!signer.verify("a|b|c", "not-hex!"));
    }
}
