// flowgate-core/src/hashing.rs
// ============================================================================
// Module: Flowgate Canonical Hashing
// Description: RFC 8785 JSON canonicalization, content hashing, and HMAC signing.
// Purpose: Provide deterministic hashes for envelopes and HMAC signatures for
//          approval ledger entries and continuation tokens.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Flowgate hashes canonical JSON using RFC 8785 (JCS) so that two semantically
//! identical payloads always hash identically regardless of field order. The
//! same canonicalization feeds the HMAC signing path used by the approval
//! ledger and approval continuation tokens.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes canonical JSON with SHA-256, returning the lowercase hex digest.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes_hex(&bytes))
}

/// Hashes raw bytes with SHA-256, returning the lowercase hex digest.
#[must_use]
pub fn hash_bytes_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

/// Returns the first 8 bytes of the SHA-256 digest of `bytes`, hex-encoded.
///
/// Used for the ingestion gateway's `payload_hash` (spec §4.3 step 5), which
/// is a short fingerprint rather than a full content-addressable digest.
#[must_use]
pub fn short_payload_hash_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex_encode(&digest[..8])
}

/// Encodes bytes as a lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test-only assertions")]
    use super::*;

    #[test]
    fn canonical_json_is_order_independent() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(hash_canonical_json(&a).unwrap(), hash_canonical_json(&b).unwrap());
    }

    #[test]
    fn short_payload_hash_is_eight_bytes() {
        let digest = short_payload_hash_hex(b"{}");
        assert_eq!(digest.len(), 16);
    }
}
