//! Unified error handling for reportgate.
//!
//! Token failures are typed by reason for logs, metrics and tests. At the
//! HTTP edge every client-caused reason collapses to one generic
//! `unauthorized`; only a missing secret surfaces differently (500 class).

use crate::reports::StoreError;
use crate::security::RateLimitDecision;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

// ============================================================================
// Token Errors (upload capability verification)
// ============================================================================

/// Reasons an upload token was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("upload token secret is not configured")]
    NotConfigured,

    #[error("missing upload token or subject")]
    MissingInput,

    #[error("malformed upload token")]
    MalformedToken,

    #[error("upload token signature mismatch")]
    BadSignature,

    #[error("malformed upload token payload")]
    MalformedPayload,

    #[error("upload token issued for a different report")]
    SubjectMismatch,

    #[error("upload token expired")]
    Expired,
}

impl TokenError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::MissingInput => "missing_input",
            Self::MalformedToken => "malformed_token",
            Self::BadSignature => "bad_signature",
            Self::MalformedPayload => "malformed_payload",
            Self::SubjectMismatch => "subject_mismatch",
            Self::Expired => "expired",
        }
    }

    /// Deployment fault rather than a client-caused failure.
    pub fn is_server_fault(&self) -> bool {
        matches!(self, Self::NotConfigured)
    }
}

// ============================================================================
// API Errors (HTTP handlers)
// ============================================================================

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rate limit exceeded")]
    RateLimited(Box<RateLimitDecision>),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    /// Required server configuration is missing.
    #[error("service unavailable: {0}")]
    Unavailable(&'static str),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show untrusted callers.
    fn public_message(&self) -> String {
        match self {
            Self::RateLimited(_) => "rate limit exceeded".to_string(),
            Self::Unauthorized => "unauthorized".to_string(),
            Self::NotFound => "not found".to_string(),
            Self::BadRequest(msg) => msg.clone(),
            Self::Unavailable(_) | Self::Internal(_) => "internal server error".to_string(),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        if err.is_server_fault() {
            Self::Unavailable("upload token secret")
        } else {
            Self::Unauthorized
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound,
            StoreError::Backend(msg) => Self::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({ "error": self.public_message() }));
        match self {
            Self::RateLimited(decision) => (status, decision.headers(), body).into_response(),
            _ => (status, body).into_response(),
        }
    }
}
