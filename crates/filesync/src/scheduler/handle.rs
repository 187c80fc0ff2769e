//! [`SyncHandle`]: cloneable front door to a running [`super::SyncScheduler`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::ServiceError;
use tokio::sync::{watch, Notify};

use crate::mirror::PassReport;

/// Lifecycle of the scheduler loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next scheduled occurrence or a manual trigger.
    Idle { next_run: DateTime<Utc> },
    /// A pass is in progress.
    Running { started_at: DateTime<Utc> },
    /// The loop has exited after cancellation. Terminal.
    Stopped,
}

impl SchedulerState {
    /// Lowercase name used in the health endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle { .. } => "idle",
            SchedulerState::Running { .. } => "running",
            SchedulerState::Stopped => "stopped",
        }
    }
}

/// Snapshot published by the scheduler after every transition.
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub last_pass: Option<PassReport>,
}

/// Acknowledgement for a manual trigger. Not a completion result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerAck {
    pub accepted_at: DateTime<Utc>,
}

/// Cloneable handle used by the HTTP layer to trigger passes and read status.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    pub(super) trigger: Arc<Notify>,
    pub(super) status: watch::Receiver<SchedulerStatus>,
}

impl SyncHandle {
    /// Ask the scheduler to run a pass as soon as possible.
    ///
    /// Returns immediately. If a pass is already running, exactly one more
    /// pass is queued behind it; repeated triggers before that pass starts
    /// are coalesced.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Unavailable`] once the scheduler has stopped.
    pub fn trigger(&self) -> Result<TriggerAck, ServiceError> {
        let gone = self.status.has_changed().is_err();
        if gone || self.status.borrow().state == SchedulerState::Stopped {
            return Err(ServiceError::Unavailable(
                "sync scheduler is not running".into(),
            ));
        }
        self.trigger.notify_one();
        Ok(TriggerAck {
            accepted_at: Utc::now(),
        })
    }

    /// Current scheduler status.
    ///
    /// Reports [`SchedulerState::Stopped`] if the scheduler task has gone away
    /// without publishing it (e.g. it was aborted).
    pub fn status(&self) -> SchedulerStatus {
        let mut status = self.status.borrow().clone();
        if self.status.has_changed().is_err() {
            status.state = SchedulerState::Stopped;
        }
        status
    }

    /// Subscribe to status transitions.
    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<SchedulerStatus> {
        self.status.clone()
    }
}
