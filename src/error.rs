//! Error types for Fedikit
//!
//! Every failure in the federation layer is an `AppError`. Inbound
//! authentication failures reach the web layer through `IntoResponse`;
//! outbound delivery failures stop at the log.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing, malformed or mismatched signature (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Missing, malformed or stale request metadata (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Actor URL cannot be used for discovery (400)
    #[error("Invalid actor: {0}")]
    InvalidActor(String),

    /// host-meta or WebFinger lookup failed (502)
    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),

    /// WebFinger document carries no activity profile link (404)
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Profile document matched neither known actor schema (502)
    #[error("Profile decode failed: {0}")]
    ProfileDecodeFailed(String),

    /// Request would reach a loopback, private or multicast target (403)
    #[error("Forbidden target: {0}")]
    ForbiddenTarget(String),

    /// Resolved actor advertises an empty public key (411)
    #[error("Public key missing: {0}")]
    LengthRequired(String),

    /// Malformed key or signature material (401)
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Network-level failure talking to a remote server (502)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// HTTP status the web layer answers with for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) | AppError::Crypto(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) | AppError::InvalidActor(_) => StatusCode::BAD_REQUEST,
            AppError::ForbiddenTarget(_) => StatusCode::FORBIDDEN,
            AppError::ProfileNotFound(_) | AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::LengthRequired(_) => StatusCode::LENGTH_REQUIRED,
            AppError::DiscoveryFailed(_)
            | AppError::ProfileDecodeFailed(_)
            | AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for the error metric
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::BadRequest(_) => "bad_request",
            AppError::InvalidActor(_) => "invalid_actor",
            AppError::DiscoveryFailed(_) => "discovery_failed",
            AppError::ProfileNotFound(_) => "profile_not_found",
            AppError::ProfileDecodeFailed(_) => "profile_decode_failed",
            AppError::ForbiddenTarget(_) => "forbidden_target",
            AppError::LengthRequired(_) => "length_required",
            AppError::Crypto(_) => "crypto",
            AppError::Transport(_) => "transport",
            AppError::NotFound => "not_found",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    /// Maps each variant to its status code and a JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let status = self.status_code();
        let error_message = match &self {
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Config(_) => "Configuration error".to_string(),
            other => other.to_string(),
        };

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[self.error_type()]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
