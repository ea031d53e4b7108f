/// Unified error types for the Meridian account engine
use crate::account::{AccountStatus, StatusEvent};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the account engine
#[derive(Error, Debug)]
pub enum Error {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Uniform authentication failure. The underlying reason (unknown
    /// identifier, wrong password, ambiguous lookup, ineligible status) is
    /// deliberately not exposed.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// A status-machine event was requested from a state it is not legal in
    #[error("Illegal status transition: {event} is not permitted from {current} (allowed from: {allowed:?})")]
    IllegalTransition {
        current: AccountStatus,
        event: StatusEvent,
        allowed: &'static [AccountStatus],
    },

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., duplicate display name)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Personal-data purge failed; the owning transaction was rolled back
    #[error("Purge failed: {0}")]
    Purge(String),

    /// Configuration errors (malformed or inconsistent settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response format handed to the web layer
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert Error to HTTP response
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            Error::AuthenticationFailed => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationFailed",
                self.to_string(),
            ),
            Error::IllegalTransition { .. } => (
                StatusCode::CONFLICT,
                "IllegalTransition",
                self.to_string(),
            ),
            Error::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            Error::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                self.to_string(),
            ),
            Error::Conflict(_) => (
                StatusCode::CONFLICT,
                "Conflict",
                self.to_string(),
            ),
            Error::Database(_) | Error::Purge(_) | Error::Config(_) | Error::Internal(_) | Error::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for account engine operations
pub type Result<T> = std::result::Result<T, Error>;
