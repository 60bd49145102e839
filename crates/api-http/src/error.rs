//! HTTP Error Types
//!
//! Maps application errors to status codes and machine-readable codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fatura_core::domain::DomainError;
use fatura_core::error::AppError;
use serde::Serialize;
use tracing::error;

/// Machine-readable error codes
pub mod code {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INVALID_TRANSITION: &str = "INVALID_TRANSITION";
    pub const CONFLICT: &str = "CONFLICT";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const DB_ERROR: &str = "DB_ERROR";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const PARSER_ERROR: &str = "PARSER_ERROR";
}

/// Error body: `{code, message}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code::VALIDATION_ERROR, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code::UNAUTHORIZED, message)
    }

    pub fn rate_limited() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            code::RATE_LIMITED,
            "Too many uploads, slow down",
        )
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let (status, code) = match &err {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, code::VALIDATION_ERROR),
            AppError::Auth(_) => (StatusCode::UNAUTHORIZED, code::UNAUTHORIZED),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, code::NOT_FOUND),
            AppError::Domain(DomainError::InvalidStatusTransition { .. }) => {
                (StatusCode::CONFLICT, code::INVALID_TRANSITION)
            }
            AppError::Domain(_) => (StatusCode::BAD_REQUEST, code::VALIDATION_ERROR),
            AppError::Conflict(_) => (StatusCode::CONFLICT, code::CONFLICT),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, code::DB_ERROR),
            AppError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, code::STORAGE_ERROR),
            AppError::Parse(_) => (StatusCode::INTERNAL_SERVER_ERROR, code::PARSER_ERROR),
            AppError::Io(_)
            | AppError::Serialization(_)
            | AppError::Config(_)
            | AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, code::INTERNAL_ERROR),
        };

        if status.is_server_error() {
            error!(error = %err, code, "Request failed");
        }
        Self::new(status, code, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
