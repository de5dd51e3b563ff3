//! ==============================================================================
//! error.rs - hub error kinds and their http mapping
//! ==============================================================================
//!
//! every request-level failure is recovered at the handler boundary and turned
//! into `{"code": "...", "message": "..."}` with a fixed status. clients match
//! on `code`, never on the message text.
//!
//! ==============================================================================

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub type HubResult<T> = Result<T, HubError>;

/// Stable error code constants.
pub mod error_code {
    pub const UNKNOWN_DEVICE: &str = "UNKNOWN_DEVICE";
    pub const OUT_OF_RANGE: &str = "OUT_OF_RANGE";
    pub const INVALID_WEIGHT: &str = "INVALID_WEIGHT";
    pub const NO_PENDING_CONFIG: &str = "NO_PENDING_CONFIG";
    pub const MALFORMED_REQUEST: &str = "MALFORMED_REQUEST";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
}

#[derive(Error, Debug)]
pub enum HubError {
    /// The device id is not in the registry. HTTP 404.
    #[error("device '{0}' is not registered")]
    UnknownDevice(String),

    /// Telemetry would break the capacity invariant. HTTP 400.
    #[error("{0}")]
    OutOfRange(String),

    /// Unit weight is not a finite non-negative number. HTTP 400.
    #[error("invalid unit weight: {0}")]
    InvalidWeight(String),

    /// Confirmation arrived with nothing staged. HTTP 404.
    #[error("no pending config for device '{0}'")]
    NoPendingConfig(String),

    /// Missing or unparseable fields. HTTP 400.
    #[error("{0}")]
    MalformedRequest(String),

    /// Snapshot could not be written. Logged by the hub, never sent to clients.
    #[error("storage error: {0}")]
    Storage(String),
}

impl HubError {
    pub fn error_code(&self) -> &'static str {
        match self {
            HubError::UnknownDevice(_) => error_code::UNKNOWN_DEVICE,
            HubError::OutOfRange(_) => error_code::OUT_OF_RANGE,
            HubError::InvalidWeight(_) => error_code::INVALID_WEIGHT,
            HubError::NoPendingConfig(_) => error_code::NO_PENDING_CONFIG,
            HubError::MalformedRequest(_) => error_code::MALFORMED_REQUEST,
            HubError::Storage(_) => error_code::STORAGE_ERROR,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            HubError::UnknownDevice(_) => StatusCode::NOT_FOUND,
            HubError::OutOfRange(_) => StatusCode::BAD_REQUEST,
            HubError::InvalidWeight(_) => StatusCode::BAD_REQUEST,
            HubError::NoPendingConfig(_) => StatusCode::NOT_FOUND,
            HubError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            HubError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for HubError {
    fn from(e: std::io::Error) -> Self {
        HubError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for HubError {
    fn from(e: serde_json::Error) -> Self {
        HubError::Storage(e.to_string())
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
