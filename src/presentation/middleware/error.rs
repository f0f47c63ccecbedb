use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Application error types that can be converted to HTTP responses
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    Authentication { message: String },

    #[error("{message}")]
    RateLimit { message: String },

    #[error("{message}")]
    Timeout { message: String },

    #[error("{message}")]
    Internal { message: String },
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            AppError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type for logging
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Authentication { .. } => "authentication",
            AppError::RateLimit { .. } => "rate_limit",
            AppError::Timeout { .. } => "timeout",
            AppError::Internal { .. } => "internal",
        }
    }

    /// Check if this error should be logged as an error (vs warning)
    pub fn should_log_as_error(&self) -> bool {
        matches!(self, AppError::Internal { .. })
    }
}

/// The uniform rejection body every pipeline stage replies with.
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub request_id: String,
}

/// Render the uniform JSON envelope for a rejected request.
pub fn error_response(status: StatusCode, message: &str, request_id: &str) -> Response {
    let body = ErrorBody {
        success: false,
        error: message.to_string(),
        request_id: request_id.to_string(),
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.should_log_as_error() {
            error!(error_type = self.error_type(), "{}", self);
        } else {
            warn!(error_type = self.error_type(), "{}", self);
        }

        error_response(self.status_code(), &self.to_string(), "unknown")
    }
}
