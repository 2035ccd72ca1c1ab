//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::SecureStorageUnavailable`] → 503
/// - [`ServiceError::Internal`] → 500
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request body was malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// No encryption key could be obtained, so bank details were not saved.
    ///
    /// This is the only credential failure shown to end users.
    #[error("unable to save bank details securely, please retry")]
    SecureStorageUnavailable,

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::SecureStorageUnavailable => 503,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in error response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::SecureStorageUnavailable => "secure_storage_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }
}
