// flowgate-core/src/errors.rs
// ============================================================================
// Module: Flowgate Error Taxonomy
// Description: Transport-agnostic error kinds shared by every component.
// Purpose: Give the gateway, runtime, and ledger a single vocabulary for
//          classifying failures so HTTP status mapping stays mechanical.
// Dependencies: thiserror, serde
// ============================================================================

//! ## Overview
//! `ErrorKind` is the taxonomy every crate-local error enum converts into at
//! its boundary. `execution_paused` is deliberately absent here: it is a
//! control-flow result, modeled by [`crate::execution::HandlerOutcome`], not
//! an error — conflating the two was the behavior this type intentionally
//! avoids.

use serde::Serialize;
use thiserror::Error;

/// Transport-agnostic error classification (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input or violated constraint.
    BadRequest,
    /// Missing or invalid credentials.
    Unauthorized,
    /// Valid credentials, missing scope or wrong key type.
    Forbidden,
    /// Addressed resource does not exist.
    NotFound,
    /// Idempotency collision or state mismatch on resume.
    Conflict,
    /// Admission denied by rate limiting.
    RateLimited,
    /// An upstream collaborator (auth, ledger, store) is unreachable.
    Dependency,
    /// Invariant violated; unexpected.
    Internal,
    /// Task cancellation, recorded as an execution failure.
    Cancelled,
}

impl ErrorKind {
    /// Returns the conventional HTTP status code for this kind.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::RateLimited => 429,
            Self::Dependency => 503,
            Self::Internal | Self::Cancelled => 500,
        }
    }
}

/// A user-visible error body: `{error: {code, message, ...}}` (spec §7).
#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
pub struct FlowgateError {
    /// Error taxonomy classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Correlation id for log cross-referencing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl FlowgateError {
    /// Builds a new error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), request_id: None }
    }

    /// Attaches a request id for correlation.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Shorthand for [`ErrorKind::BadRequest`].
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    /// Shorthand for [`ErrorKind::NotFound`].
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Shorthand for [`ErrorKind::Conflict`].
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Shorthand for [`ErrorKind::Internal`].
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Shorthand for [`ErrorKind::Dependency`].
    #[must_use]
    pub fn dependency(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dependency, message)
    }
}
