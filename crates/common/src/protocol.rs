//! Request and response types exposed by the filesync HTTP surface.
//!
//! All bodies are JSON. Timestamps are serialised as RFC 3339 strings in UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Manual sync trigger
// ---------------------------------------------------------------------------

/// Response body for `POST /sync/now`.
///
/// The trigger is fire-and-forget: `accepted` means a pass has been queued,
/// not that it has finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAcceptedResponse {
    /// Always `"accepted"`.
    pub status: String,
    /// Instant at which the trigger was accepted.
    pub accepted_at: DateTime<Utc>,
}

impl SyncAcceptedResponse {
    pub fn new(accepted_at: DateTime<Utc>) -> Self {
        Self {
            status: "accepted".into(),
            accepted_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"forbidden"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&crate::ServiceError> for ErrorResponse {
    fn from(err: &crate::ServiceError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Summary of the most recent completed sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Entries whose local copy was rewritten.
    pub updated: usize,
    /// Entries the remote reported as not modified.
    pub unchanged: usize,
    /// Entries that failed and will be retried on the next pass.
    pub failed: usize,
}

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"stopped"`.
    pub status: String,
    /// Scheduler state: `"idle"`, `"running"` or `"stopped"`.
    pub scheduler: String,
    /// Next scheduled pass, when the scheduler is idle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    /// Most recent completed pass, if any has run yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_pass: Option<PassSummary>,
}
