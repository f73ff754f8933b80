//!
//! # Custom Error Handling
//!
//! This module defines the custom error type `AppError` used by every HTTP handler.
//! Domain layers (credentials, store, broker) report their own error enums; those are
//! converted into `AppError` at the service boundary so that each failure maps to a
//! stable status code and a human-readable message.
//!
//! Internal failure detail (query text, driver messages) is logged here and never
//! written into the response body.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use std::fmt;
use validator::ValidationErrors;

use crate::auth::{AuthError, RegistrationError};
use crate::broker::BrokerError;
use crate::store::StoreError;

/// Non-standard status used when the admin channel has no active administrator.
pub const ADMIN_NOT_ACTIVE_STATUS: u16 = 444;

/// Represents all possible errors that can surface from a request handler.
#[derive(Debug)]
pub enum AppError {
    /// Authentication failed or is required but missing (HTTP 401).
    Unauthorized(String),
    /// The caller is authenticated but lacks the required role (HTTP 403).
    Forbidden(String),
    /// Malformed request (HTTP 400).
    BadRequest(String),
    /// Uniqueness violation, e.g. a username that is already taken (HTTP 400).
    Conflict(String),
    /// The requested resource does not exist (HTTP 404).
    NotFound(String),
    /// Input failed validation (HTTP 422 Unprocessable Entity).
    ValidationError(String),
    /// Store failure (HTTP 500). The message is logged, not returned.
    DatabaseError(String),
    /// Unexpected server-side error (HTTP 500). The message is logged, not returned.
    InternalServerError(String),
    /// A collaborator the request depends on is unreachable (HTTP 503).
    ServiceUnavailable(String),
    /// The admin rendezvous timed out without a message (HTTP 444).
    AdminNotActive(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database Error: {}", msg),
            AppError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service Unavailable: {}", msg),
            AppError::AdminNotActive(msg) => write!(f, "Admin Not Active: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::AdminNotActive(_) => StatusCode::from_u16(ADMIN_NOT_ACTIVE_STATUS)
                .unwrap_or(StatusCode::PRECONDITION_FAILED),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                log::error!("{}", self);
                "Internal server error".to_string()
            }
            AppError::ServiceUnavailable(_) => {
                log::warn!("{}", self);
                "Service temporarily unavailable".to_string()
            }
            AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::BadRequest(msg)
            | AppError::Conflict(msg)
            | AppError::NotFound(msg)
            | AppError::ValidationError(msg)
            | AppError::AdminNotActive(msg) => msg.clone(),
        };

        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}

/// Converts `validator::ValidationErrors` into `AppError::ValidationError`.
///
/// The detailed validation messages are preserved.
impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::ValidationError(error.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(error: AuthError) -> AppError {
        match error {
            AuthError::Forbidden => AppError::Forbidden(error.to_string()),
            AuthError::Internal(detail) => AppError::InternalServerError(detail),
            _ => AppError::Unauthorized(error.to_string()),
        }
    }
}

impl From<RegistrationError> for AppError {
    fn from(error: RegistrationError) -> AppError {
        match error {
            RegistrationError::NameTaken | RegistrationError::EmailTaken => {
                AppError::Conflict(error.to_string())
            }
            RegistrationError::InvalidEmail => AppError::ValidationError(error.to_string()),
            RegistrationError::Persistence(detail) => AppError::DatabaseError(detail),
        }
    }
}

/// Converts store failures. Row absence becomes `NotFound`; uniqueness violations become
/// `Conflict`; everything else is an opaque database error.
impl From<StoreError> for AppError {
    fn from(error: StoreError) -> AppError {
        match error {
            StoreError::NotFound => AppError::NotFound("Record not found".into()),
            StoreError::UniqueViolation(_) => AppError::Conflict("Record already exists".into()),
            StoreError::ForeignKeyViolation(_) => {
                AppError::BadRequest("Referenced record does not exist".into())
            }
            StoreError::Database(detail) => AppError::DatabaseError(detail),
        }
    }
}

impl From<BrokerError> for AppError {
    fn from(error: BrokerError) -> AppError {
        AppError::ServiceUnavailable(error.to_string())
    }
}
