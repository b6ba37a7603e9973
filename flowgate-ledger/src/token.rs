// flowgate-ledger/src/token.rs
// ============================================================================
// Module: Approval Continuation Token
// Description: Mint and verify the out-of-band token an approver redeems to
//              resume a paused execution.
// Purpose: Bind a token to one execution/node/role with an expiry, signed so
//          it cannot be forged or replayed after tampering.
// Dependencies: base64, serde_json, flowgate-core, crate::signer
// ============================================================================

//! ## Overview
//! A token is `base64url(claims_json) + "." + hex(hmac_tag)`, where the tag
//! covers the base64 payload segment. Decoding never trusts the claims
//! before the signature verifies; claims and signature are checked together
//! in [`verify_token`].

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use flowgate_core::interfaces::ApprovalSigner;
use flowgate_core::ledger::ApprovalTokenClaims;
use flowgate_core::ledger::TokenRejection;
use flowgate_core::time::Timestamp;

/// Mints a signed continuation token for `claims`.
#[must_use]
pub fn mint_token(signer: &dyn ApprovalSigner, claims: &ApprovalTokenClaims) -> String {
    let payload = serde_json::to_vec(claims).unwrap_or_default();
    let encoded = URL_SAFE_NO_PAD.encode(payload);
    let signature = signer.sign(&encoded);
    format!("{encoded}.{signature}")
}

/// Verifies `token`, returning the enclosed claims if the signature is valid
/// and the token has not expired.
///
/// # Errors
///
/// Returns [`TokenRejection::InvalidSignature`] if the token is malformed,
/// not valid base64/JSON, or fails HMAC verification; returns
/// [`TokenRejection::Expired`] if the signature is valid but `expires_at`
/// has passed.
pub fn verify_token(signer: &dyn ApprovalSigner, token: &str) -> Result<ApprovalTokenClaims, TokenRejection> {
    let (encoded, signature) = token.split_once('.').ok_or(TokenRejection::InvalidSignature)?;
    if !signer.verify(encoded, signature) {
        return Err(TokenRejection::InvalidSignature);
    }
    let payload = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| TokenRejection::InvalidSignature)?;
    let claims: ApprovalTokenClaims =
        serde_json::from_slice(&payload).map_err(|_| TokenRejection::InvalidSignature)?;
    if claims.expires_at < Timestamp::now() {
        return Err(TokenRejection::Expired);
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test-only assertions")]
    use super::*;
    use crate::signer::HmacApprovalSigner;
    use flowgate_core::ids::ExecutionId;
    use flowgate_core::ids::NodeId;
    use flowgate_core::ids::OrgId;
    use std::time::Duration;

    fn sample_claims(expires_at: Timestamp) -> ApprovalTokenClaims {
        ApprovalTokenClaims {
            execution_id: ExecutionId::new("ex1"),
            node_id: NodeId::new("n1"),
            required_role: "manager".to_string(),
            org_id: OrgId::new("o1"),
            expires_at,
        }
    }

    #[test]
    fn mint_then_verify_round_trips() {
        let signer = HmacApprovalSigner::new(b"secret".to_vec());
        let claims = sample_claims(Timestamp::now().add_duration(Duration::from_secs(3600)));
        let token = mint_token(&signer, &claims);
        let verified = verify_token(&signer, &token).unwrap();
        assert_eq!(verified.execution_id, claims.execution_id);
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = HmacApprovalSigner::new(b"secret".to_vec());
        let claims = sample_claims(Timestamp::parse("2000-01-01T00:00:00Z").unwrap());
        let token = mint_token(&signer, &claims);
        assert_eq!(verify_token(&signer, &token), Err(TokenRejection::Expired));
    }

    #[test]
    fn tampered_token_fails_signature_check() {
        let signer = HmacApprovalSigner::new(b"secret".to_vec());
        let claims = sample_claims(Timestamp::now().add_duration(Duration::from_secs(3600)));
        let mut token = mint_token(&signer, &claims);
        token.push('x');
        assert_eq!(verify_token(&signer, &token), Err(TokenRejection::InvalidSignature));
    }

    #[test]
    fn wrong_secret_fails_signature_check() {
        let signer = HmacApprovalSigner::new(b"secret".to_vec());
        let other = HmacApprovalSigner::new(b"other".to_vec());
        let claims = sample_claims(Timestamp::now().add_duration(Duration::from_secs(3600)));
        let token = mint_token(&signer, &claims);
        assert_eq!(verify_token(&other, &token), Err(TokenRejection::InvalidSignature));
    }
}
