use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::{Error, JobError, StorageError, ValidationError};

/// Error type for HTTP handlers.
///
/// Wraps the relay's [`Error`] and adds HTTP-only variants. Every response
/// carries a JSON body of the form `{"error": message, "code": CODE}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Relay(#[from] Error),

    /// Missing or unknown bearer token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed request that never reached the service.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Fetching the generated artifact failed.
    #[error("Upstream error: {0}")]
    Upstream(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        Self::Relay(e.into())
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Relay(e.into())
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        Self::Relay(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Relay(err) => classify(err),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Upstream(msg) => {
                tracing::error!(error = %msg, "Upstream fetch failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "Failed to fetch generated video".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify(err: &Error) -> (StatusCode, &'static str, String) {
    match err {
        Error::Validation(v @ ValidationError::InsufficientCredits { .. }) => (
            StatusCode::PAYMENT_REQUIRED,
            "INSUFFICIENT_CREDITS",
            v.to_string(),
        ),
        Error::Validation(v) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", v.to_string()),

        Error::Job(job) => match job {
            JobError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", "Task not found".into()),
            JobError::NoResult { .. } => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Video not available".into(),
            ),
            JobError::Forbidden { .. } => (StatusCode::FORBIDDEN, "FORBIDDEN", "Access denied".into()),
            JobError::InvalidState { .. } | JobError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, "INVALID_STATE", job.to_string())
            }
        },

        Error::Storage(StorageError::FileNotFound(_)) => {
            (StatusCode::NOT_FOUND, "NOT_FOUND", "File not found".into())
        }
        Error::Storage(StorageError::InvalidName(_)) => {
            (StatusCode::FORBIDDEN, "FORBIDDEN", "Access denied".into())
        }

        Error::ShuttingDown => (
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            err.to_string(),
        ),

        Error::Remote(e) => {
            tracing::error!(error = %e, "Remote backend error");
            (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
                "Remote generation backend unavailable".into(),
            )
        }

        other => {
            tracing::error!(error = %other, "Internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}
