//! Shared application state injected into every Axum handler.

use crate::scheduler::SyncHandle;

/// Application state shared across all request handlers.
///
/// Cloned per request; [`SyncHandle`] is `Arc`/channel-backed.
#[derive(Clone)]
pub struct AppState {
    /// Trigger and status access to the sync scheduler.
    pub sync: SyncHandle,
}

impl AppState {
    pub fn new(sync: SyncHandle) -> Self {
        Self { sync }
    }
}
