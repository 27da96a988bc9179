//! # API Error Type
//!
//! Errors as the dashboard and devices see them.
//!
//! ## Status Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  VALIDATION_ERROR   400   bad payload, command outside the allow-list  │
//! │  NOT_FOUND          404   unknown command id                           │
//! │  COMMAND_REJECTED   409   report for a finished command, bad start     │
//! │  CONFLICT           409   lost every compare-and-set attempt           │
//! │  UNKNOWN_DEVICE     422   command for a device never registered        │
//! │  DATABASE_ERROR     500   details logged, never returned               │
//! │  UNAVAILABLE        503   pool not connected or exhausted              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use fleet_core::{CoreError, ValidationError};
use fleet_db::{CommandError, DbError};

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Human-readable message
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    CommandRejected,
    Conflict,
    UnknownDevice,
    DatabaseError,
    Unavailable,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::CommandRejected | ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::UnknownDevice => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => e.into(),
            other => ApiError::new(ErrorCode::CommandRejected, other.to_string()),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotConnected | DbError::PoolExhausted | DbError::ConnectionFailed(_) => {
                tracing::warn!(error = %err, "Database unavailable");
                ApiError::new(ErrorCode::Unavailable, "Database unavailable")
            }
            DbError::CheckViolation { message } => ApiError::validation(message),
            other => {
                tracing::error!(error = %other, "Database operation failed");
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

impl From<CommandError> for ApiError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Rejected(e) => e.into(),
            CommandError::UnknownDevice(id) => {
                ApiError::new(ErrorCode::UnknownDevice, format!("Unknown device: {id}"))
            }
            CommandError::NotFound(id) => {
                ApiError::new(ErrorCode::NotFound, format!("Command not found: {id}"))
            }
            e @ CommandError::Conflict(_) => ApiError::new(ErrorCode::Conflict, e.to_string()),
            CommandError::Storage(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
