//! Error types and handling
//!
//! All errors are converted to a consistent JSON response format.
//! Ingress policy failures (origin, rate limit, IP allow-list) short-circuit
//! before business logic; session failures carry a reason the caller can act
//! on (re-login vs refresh).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Request Origin header is not in the configured allow-list (403)
    #[error("Origin not allowed: {0}")]
    OriginRejected(String),

    /// Rate limit ceiling exceeded for the tier (429)
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimited {
        /// Seconds until the current window resets
        retry_after: u64,
    },

    /// Client address is not in the configured IP allow-list (403)
    #[error("Address not allowed: {0}")]
    ForbiddenAddress(String),

    /// No session matches the presented bearer token (401)
    #[error("Session not found")]
    SessionNotFound,

    /// Session is expired or has been revoked (401)
    #[error("Session has expired")]
    SessionExpired,

    /// Refresh token is unknown, expired, or revoked (401)
    #[error("Invalid refresh token")]
    RefreshTokenInvalid,

    /// Outbound mail transport failure (non-fatal to callers)
    #[error("Email delivery failed: {0}")]
    DeliveryFailed(String),

    /// Malformed input to any operation (422)
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unauthorized - authentication required (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Conflict - resource already exists (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(String),
}

/// Error response body
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Seconds until a rate-limited client may retry
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            retry_after: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, should_log) = match &self {
            AppError::OriginRejected(_) => (StatusCode::FORBIDDEN, "origin_rejected", true),
            AppError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited", false),
            AppError::ForbiddenAddress(_) => (StatusCode::FORBIDDEN, "forbidden_address", true),
            AppError::SessionNotFound => (StatusCode::UNAUTHORIZED, "session_not_found", false),
            AppError::SessionExpired => (StatusCode::UNAUTHORIZED, "session_expired", false),
            AppError::RefreshTokenInvalid => {
                (StatusCode::UNAUTHORIZED, "refresh_token_invalid", false)
            }
            AppError::DeliveryFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "delivery_failed", true)
            }
            AppError::ValidationFailed(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed", false)
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", false),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized", false),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict", false),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", true),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error", true),
        };

        // Log server errors
        if should_log {
            error!(error = %self, error_type = error_type, "Request error");
        }

        let mut body = ErrorResponse::new(error_type, self.to_string());

        let mut headers = axum::http::HeaderMap::new();
        if let AppError::RateLimited { retry_after } = &self {
            body.retry_after = Some(*retry_after);
            if let Ok(value) = retry_after.to_string().parse() {
                headers.insert("Retry-After", value);
            }
        }

        (status, headers, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.message().contains("UNIQUE constraint failed") {
                    AppError::Conflict("Resource already exists".to_string())
                } else {
                    AppError::Database(db_err.to_string())
                }
            }
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationFailed(err.to_string())
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::SessionExpired;
        assert_eq!(err.to_string(), "Session has expired");
    }

    #[test]
    fn test_rate_limited_carries_retry_after() {
        let err = AppError::RateLimited { retry_after: 120 };
        assert!(err.to_string().contains("120"));
    }

    #[test]
    fn test_error_response_serialization() {
        let mut response = ErrorResponse::new("rate_limited", "Too many requests");
        response.retry_after = Some(900);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("rate_limited"));
        assert!(json.contains("\"retryAfter\":900"));
    }

    #[test]
    fn test_retry_after_omitted_when_absent() {
        let response = ErrorResponse::new("not_found", "Resource not found");
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("retryAfter"));
    }

    #[test]
    fn test_sqlx_not_found_conversion() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
