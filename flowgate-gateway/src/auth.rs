// flowgate-gateway/src/auth.rs
// ============================================================================
// Module: Ingestion Gateway Auth
// Description: API key hashing and the outbound HTTP auth-validation client.
// Purpose: Implement the key-hash computation the gateway performs itself
//          (spec §6: `HMAC_SHA256(hmac_secret, raw_key)` hex) and an
//          `AuthValidator` that calls out to the auth collaborator over HTTP.
// Dependencies: flowgate-core, hmac, sha2, reqwest
// ============================================================================

//! ## Overview
//! The gateway never stores credentials beyond the HMAC secret used to hash
//! incoming keys before they leave the process. `HttpAuthValidator` is the
//! production collaborator; tests and local runs can substitute any other
//! [`flowgate_core::interfaces::AuthValidator`].

use std::time::Duration;

use async_trait::async_trait;
use flowgate_core::ids::Mode;
use flowgate_core::ids::OrgId;
use flowgate_core::ids::UserId;
use flowgate_core::ids::ZoneId;
use flowgate_core::interfaces::AuthError;
use flowgate_core::interfaces::AuthResult;
use flowgate_core::interfaces::AuthValidator;
use flowgate_core::interfaces::KeyType;
use hmac::Hmac;
use hmac::Mac;
use reqwest::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes the key hash the auth collaborator expects:
/// `hex(HMAC_SHA256(secret, raw_key))` (spec §6).
#[must_use]
pub fn hash_api_key(secret: &[u8], raw_key: &str) -> String {
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(secret) else {
        return String::new();
    };
    mac.update(raw_key.as_bytes());
    flowgate_core::hashing::hex_encode(&mac.finalize().into_bytes())
}

/// Outbound HTTP client for the auth-validation collaborator (spec §6).
pub struct HttpAuthValidator {
    base_url: String,
    client: Client,
}

impl HttpAuthValidator {
    /// Builds a client against `base_url` (no trailing slash expected).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unreachable`] when the HTTP client cannot be built.
    pub fn new(mut base_url: String, request_timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| AuthError::Unreachable(err.to_string()))?;
        let trimmed_len = base_url.trim_end_matches('/').len();
        base_url.truncate(trimmed_len);
        Ok(Self { base_url, client })
    }
}

#[derive(Debug, Serialize)]
struct ValidateRequestBody<'a> {
    key_hash: &'a str,
}

#[derive(Debug, Deserialize)]
struct ValidateResponseBody {
    valid: bool,
    user_id: String,
    org_id: String,
    zone_id: String,
    mode: String,
    role: String,
    scopes: Vec<String>,
    key_type: String,
    rate_limit_quota: u32,
}

impl ValidateResponseBody {
    fn into_auth_result(self) -> Result<AuthResult, AuthError> {
        let mode = match self.mode.as_str() {
            "test" => Mode::Test,
            "live" => Mode::Live,
            other => return Err(AuthError::Unreachable(format!("unknown mode in auth response: {other}"))),
        };
        let key_type = match self.key_type.as_str() {
            "secret" => KeyType::Secret,
            "publishable" => KeyType::Publishable,
            other => return Err(AuthError::Unreachable(format!("unknown key_type in auth response: {other}"))),
        };
        Ok(AuthResult {
            valid: self.valid,
            user_id: UserId::new(self.user_id),
            org_id: OrgId::new(self.org_id),
            zone_id: ZoneId::new(self.zone_id),
            mode,
            role: self.role,
            scopes: self.scopes,
            key_type,
            rate_limit_quota: self.rate_limit_quota,
        })
    }
}

#[async_trait]
impl AuthValidator for HttpAuthValidator {
    async fn validate(&self, key_hash: &str) -> Result<AuthResult, AuthError> {
        let url = format!("{}/v1/auth/validate", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&ValidateRequestBody { key_hash })
            .send()
            .await
            .map_err(|err| AuthError::Unreachable(err.to_string()))?;
        match response.status() {
            StatusCode::OK => {
                let body: ValidateResponseBody =
                    response.json().await.map_err(|err| AuthError::Unreachable(err.to_string()))?;
                if !body.valid {
                    return Err(AuthError::Invalid);
                }
                body.into_auth_result()
            }
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => Err(AuthError::Invalid),
            status => Err(AuthError::Unreachable(format!("auth collaborator returned {status}"))),
        }
    }
}
