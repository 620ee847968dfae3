//! Error types for hearing-sync
//!
//! `SyncError` is the core taxonomy used throughout the engine; `ApiError`
//! adapts failures for the HTTP status surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::SourceType;

/// Result type for core sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Core error taxonomy.
///
/// `SourceUnavailable` counts toward circuit-breaker failures;
/// `SourceDataInvalid` does not (a data problem, not an availability
/// problem). The review band is not an error at all and never appears
/// here; it surfaces as a `NeedsReview` record.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network/timeout/HTTP failure talking to a source. The field is
    /// named `source_type` because thiserror reserves `source` for error
    /// chaining.
    #[error("source {source_type} unavailable: {message}")]
    SourceUnavailable {
        source_type: SourceType,
        message: String,
    },

    /// Malformed or incomplete record rejected at the orchestrator boundary
    #[error("invalid source data: {0}")]
    SourceDataInvalid(String),

    /// Store write failed after retries were exhausted
    #[error("store write failed: {0}")]
    StoreWrite(String),

    /// Store unreachable entirely; the committee's cycle halts
    #[error("cycle aborted: {0}")]
    CycleAborted(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether this failure should increment a source's circuit breaker.
    pub fn counts_toward_breaker(&self) -> bool {
        matches!(self, SyncError::SourceUnavailable { .. })
    }
}

/// API error type for the HTTP surface
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Core sync error
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Sync(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SYNC_ERROR",
                err.to_string(),
            ),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;
