//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::Forbidden`] → 403
/// - [`ServiceError::Unavailable`] → 503
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The caller is not allowed to use this endpoint (e.g. non-loopback sync trigger).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The sync scheduler has stopped and no longer accepts work.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::Forbidden(_) => 403,
            ServiceError::Unavailable(_) => 503,
        }
    }

    /// Short machine-readable code used in [`crate::protocol::ErrorResponse`].
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::Unavailable(_) => "service_unavailable",
        }
    }
}
