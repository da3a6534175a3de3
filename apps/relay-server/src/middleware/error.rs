//! Error handling - RFC 7807 compliant responses.

use std::fmt;
use std::time::Duration;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use relay_core::AdmissionError;
use relay_core::ports::RateLimitError;
use relay_shared::ErrorResponse;

/// Application-level error type that converts to RFC 7807 responses.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    /// Rate limiter rejected the call. `None` means the tier may never call this operation.
    RateLimited { retry_after: Option<Duration> },
    AbuseBlocked,
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::RateLimited { .. } => write!(f, "Rate limited"),
            AppError::AbuseBlocked => write!(f, "Blocked from relay"),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::AbuseBlocked => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());

        let error = match self {
            AppError::BadRequest(detail) => ErrorResponse::bad_request(detail),
            AppError::RateLimited {
                retry_after: Some(wait),
            } => {
                builder
                    .insert_header(("X-RateLimit-Remaining", "0"))
                    .insert_header(("Retry-After", wait.as_secs().to_string()));
                ErrorResponse::too_many_requests(format!(
                    "Rate limit exceeded. Try again in {} seconds.",
                    wait.as_secs()
                ))
            }
            AppError::RateLimited { retry_after: None } => {
                ErrorResponse::too_many_requests("This operation is not permitted for this caller.")
            }
            AppError::AbuseBlocked => ErrorResponse::abuse_blocked(),
            AppError::Internal(detail) => {
                // Log internal errors
                tracing::error!("Internal error: {}", detail);
                ErrorResponse::internal_error()
            }
        };

        builder.json(error)
    }
}

impl From<RateLimitError> for AppError {
    fn from(err: RateLimitError) -> Self {
        // Every rate limiter error is a deployment mismatch, never the client's fault.
        AppError::Internal(err.to_string())
    }
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;
