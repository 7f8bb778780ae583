//! API error types and JSON error response formatting.
//!
//! Every non-streaming failure is answered with one JSON object
//! `{ "error": code, "message": text }` and a fixed status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use pulse_chat::ChatError;

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "provider_error").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - malformed body or invalid message.
    BadRequest(String),
    /// 429 Too Many Requests - rate limit exceeded.
    TooManyRequests,
    /// 500 - the model provider failed before streaming started.
    Provider(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Provider(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_code, message) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg),
            ApiError::TooManyRequests => ("too_many_requests", "Rate limit exceeded".to_string()),
            ApiError::Provider(msg) => ("provider_error", msg),
            ApiError::Internal(msg) => ("internal_error", msg),
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyMessage | ChatError::MessageTooLong(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ChatError::Provider(_) | ChatError::Transport(_) => ApiError::Provider(err.to_string()),
        }
    }
}

impl From<pulse_core::PulseError> for ApiError {
    fn from(err: pulse_core::PulseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
