use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type GuardResult<T> = Result<T, GuardError>;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limit exceeded for '{category}', resets at {reset_time}")]
    RateLimitExceeded { category: String, reset_time: i64 },

    #[error("Duplicate request in flight: {request_key}")]
    DuplicateInFlight { request_key: String },

    #[error("No page token cached for page {page} of '{query}', restart from page 1")]
    PageTokenNotFound { query: String, page: u32 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for GuardError {
    fn from(err: redis::RedisError) -> Self {
        GuardError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        GuardError::Configuration(err.to_string())
    }
}

impl From<std::io::Error> for GuardError {
    fn from(err: std::io::Error) -> Self {
        GuardError::Configuration(err.to_string())
    }
}

impl From<validator::ValidationErrors> for GuardError {
    fn from(err: validator::ValidationErrors) -> Self {
        GuardError::Validation(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_guard_error(err: &GuardError) -> Self {
        let message = err.to_string();
        match err {
            GuardError::Store(_) => Self::new("service_unavailable", &message, 503),
            GuardError::Configuration(_) => Self::new("configuration_error", &message, 500),
            GuardError::Validation(_) => Self::new("validation_error", &message, 422),
            GuardError::RateLimitExceeded { .. } => {
                Self::new("rate_limit_exceeded", &message, 429)
            }
            GuardError::DuplicateInFlight { .. } => Self::new("duplicate_in_flight", &message, 409),
            GuardError::PageTokenNotFound { .. } => {
                Self::new("page_token_not_found", &message, 400)
            }
            GuardError::Internal(_) => Self::new("internal_error", &message, 500),
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_guard_error(&self);
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}
