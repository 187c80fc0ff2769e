//! Long-lived sync loop: wait for the next cron occurrence, run a pass, repeat.
//!
//! # Lifecycle
//!
//! ```text
//! Idle(next_run) ──timer / trigger──► Running ──pass done──► Idle(next_run')
//!       │                                │
//!       └──────────── cancel ────────────┴──(grace period)──► Stopped
//! ```
//!
//! Manual triggers only wake the loop; the loop is the sole caller of
//! [`MirrorSynchronizer::run_pass`], so passes never overlap. A trigger that
//! arrives mid-pass leaves a `Notify` permit behind and the loop runs exactly
//! one more pass when the current one finishes.

mod handle;

pub use handle::{SchedulerState, SchedulerStatus, SyncHandle, TriggerAck};

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::mirror::MirrorSynchronizer;
use crate::schedule::{compute_delay, ScheduleSet};

/// Timing knobs for the loop.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Sleep used when no cron rule yields a future occurrence.
    pub fallback_wait: Duration,
    /// Floor for every sleep.
    pub min_delay: Duration,
    /// How long an in-flight pass may keep running after cancellation.
    pub shutdown_grace: Duration,
    /// Run one pass before the first wait.
    pub run_on_startup: bool,
}

#[derive(Debug, Clone, Copy)]
enum Wake {
    Timer,
    Trigger,
}

/// Drives [`MirrorSynchronizer`] passes on a [`ScheduleSet`].
pub struct SyncScheduler {
    schedule: ScheduleSet,
    synchronizer: Arc<MirrorSynchronizer>,
    settings: SchedulerSettings,
    trigger: Arc<Notify>,
    status: watch::Sender<SchedulerStatus>,
}

impl SyncScheduler {
    /// Create the scheduler and the handle used to trigger it.
    pub fn new(
        schedule: ScheduleSet,
        synchronizer: Arc<MirrorSynchronizer>,
        settings: SchedulerSettings,
    ) -> (Self, SyncHandle) {
        let now = Utc::now();
        let delay = compute_delay(
            schedule.next_occurrence(now),
            now,
            settings.fallback_wait,
            settings.min_delay,
        );
        let (status, rx) = watch::channel(SchedulerStatus {
            state: SchedulerState::Idle {
                next_run: now + to_chrono(delay),
            },
            last_pass: None,
        });
        let trigger = Arc::new(Notify::new());

        let handle = SyncHandle {
            trigger: trigger.clone(),
            status: rx,
        };
        let scheduler = Self {
            schedule,
            synchronizer,
            settings,
            trigger,
            status,
        };
        (scheduler, handle)
    }

    /// Spawn [`run`](Self::run) on the Tokio runtime.
    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Loop until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let expressions: Vec<&str> = self.schedule.expressions().collect();
        info!(rules = expressions.len(), ?expressions, "sync scheduler started");
        if self.schedule.is_empty() {
            warn!(
                fallback_secs = self.settings.fallback_wait.as_secs(),
                "no cron rules configured; passes run on the fallback interval"
            );
        }

        let mut keep_going = !self.settings.run_on_startup || self.execute_pass(&shutdown).await;

        while keep_going {
            let now = Utc::now();
            let delay = compute_delay(
                self.schedule.next_occurrence(now),
                now,
                self.settings.fallback_wait,
                self.settings.min_delay,
            );
            let next_run = now + to_chrono(delay);
            info!(delay_secs = delay.as_secs(), %next_run, "next sync scheduled");
            self.status
                .send_modify(|s| s.state = SchedulerState::Idle { next_run });

            let wake = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = self.trigger.notified() => Wake::Trigger,
                _ = tokio::time::sleep(delay) => Wake::Timer,
            };
            info!(reason = ?wake, "sync woke up");

            keep_going = self.execute_pass(&shutdown).await;
        }

        self.status.send_modify(|s| s.state = SchedulerState::Stopped);
        info!("sync scheduler stopped");
    }

    /// Run one pass, publishing `Running` and the resulting report.
    ///
    /// Returns `false` if the pass was abandoned because shutdown was
    /// requested and the grace period ran out.
    async fn execute_pass(&self, shutdown: &CancellationToken) -> bool {
        self.status.send_modify(|s| {
            s.state = SchedulerState::Running {
                started_at: Utc::now(),
            }
        });

        let grace = self.settings.shutdown_grace;
        let deadline = async {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        };

        tokio::select! {
            report = self.synchronizer.run_pass() => {
                self.status.send_modify(|s| s.last_pass = Some(report));
                !shutdown.is_cancelled()
            }
            _ = deadline => {
                warn!(grace_secs = grace.as_secs(), "abandoning in-flight sync pass after shutdown grace period");
                false
            }
        }
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::{MirrorMapping, RawMirrorMapping, ResourceFetcher};
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> SchedulerSettings {
        SchedulerSettings {
            fallback_wait: Duration::from_secs(3600),
            min_delay: Duration::from_secs(60),
            shutdown_grace: Duration::from_millis(200),
            run_on_startup: false,
        }
    }

    fn scheduler(
        root: &TempDir,
        urls: &[(&str, String)],
        settings: SchedulerSettings,
    ) -> (SyncScheduler, SyncHandle) {
        let mut raw = RawMirrorMapping::new();
        for (filename, url) in urls {
            raw.entry("docs".to_owned())
                .or_default()
                .insert((*filename).to_owned(), url.clone());
        }
        let synchronizer = MirrorSynchronizer::new(
            root.path().to_owned(),
            MirrorMapping::from_raw(&raw).unwrap(),
            ResourceFetcher::new(Duration::from_secs(5)).unwrap(),
            4,
        );
        // An empty schedule always sleeps for the fallback, so only triggers
        // and cancellation wake the loop in these tests.
        SyncScheduler::new(ScheduleSet::default(), Arc::new(synchronizer), settings)
    }

    async fn wait_until<F>(handle: &SyncHandle, mut pred: F)
    where
        F: FnMut(&SchedulerStatus) -> bool,
    {
        let mut rx = handle.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if pred(&*rx.borrow_and_update()) {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await
        .expect("scheduler did not reach the expected status in time");
    }

    #[tokio::test]
    async fn initial_state_is_idle_with_fallback() {
        let root = TempDir::new().unwrap();
        let before = Utc::now();
        let (_scheduler, handle) = scheduler(&root, &[], settings());

        match handle.status().state {
            SchedulerState::Idle { next_run } => {
                assert!(next_run >= before + chrono::Duration::seconds(3600));
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert!(handle.status().last_pass.is_none());
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_wait() {
        let root = TempDir::new().unwrap();
        let (scheduler, handle) = scheduler(&root, &[], settings());
        let shutdown = CancellationToken::new();
        let task = scheduler.spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("scheduler should stop promptly")
            .unwrap();
        assert_eq!(handle.status().state, SchedulerState::Stopped);
        assert!(handle.trigger().is_err());
    }

    #[tokio::test]
    async fn trigger_runs_a_pass() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
            .mount(&server)
            .await;

        let root = TempDir::new().unwrap();
        let (scheduler, handle) = scheduler(
            &root,
            &[("readme.txt", format!("{}/readme.txt", server.uri()))],
            settings(),
        );
        let shutdown = CancellationToken::new();
        let task = scheduler.spawn(shutdown.clone());

        handle.trigger().unwrap();
        wait_until(&handle, |s| s.last_pass.is_some()).await;

        let report = handle.status().last_pass.unwrap();
        assert_eq!(report.updated, 1);
        assert!(root.path().join("docs/readme.txt").exists());

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn triggers_during_a_pass_queue_exactly_one_more() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow")
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let root = TempDir::new().unwrap();
        let (scheduler, handle) = scheduler(
            &root,
            &[("slow.txt", format!("{}/slow.txt", server.uri()))],
            settings(),
        );
        let shutdown = CancellationToken::new();
        let task = scheduler.spawn(shutdown.clone());

        handle.trigger().unwrap();
        wait_until(&handle, |s| matches!(s.state, SchedulerState::Running { .. })).await;
        handle.trigger().unwrap();
        handle.trigger().unwrap();
        handle.trigger().unwrap();

        // Second pass starts, then finishes and returns to idle.
        wait_until(&handle, |s| {
            s.last_pass.is_some() && matches!(s.state, SchedulerState::Running { .. })
        })
        .await;
        wait_until(&handle, |s| matches!(s.state, SchedulerState::Idle { .. })).await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(server.received_requests().await.unwrap().len(), 2);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn run_on_startup_performs_an_initial_pass() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("boot"))
            .mount(&server)
            .await;

        let root = TempDir::new().unwrap();
        let mut s = settings();
        s.run_on_startup = true;
        let (scheduler, handle) =
            scheduler(&root, &[("boot.txt", format!("{}/boot.txt", server.uri()))], s);
        let shutdown = CancellationToken::new();
        let task = scheduler.spawn(shutdown.clone());

        wait_until(&handle, |s| s.last_pass.is_some()).await;
        assert!(root.path().join("docs/boot.txt").exists());

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_abandons_a_stuck_pass_after_grace() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(4)))
            .mount(&server)
            .await;

        let root = TempDir::new().unwrap();
        let (scheduler, handle) = scheduler(
            &root,
            &[("stuck.txt", format!("{}/stuck.txt", server.uri()))],
            settings(),
        );
        let shutdown = CancellationToken::new();
        let task = scheduler.spawn(shutdown.clone());

        handle.trigger().unwrap();
        wait_until(&handle, |s| matches!(s.state, SchedulerState::Running { .. })).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("grace period should bound shutdown")
            .unwrap();
        assert_eq!(handle.status().state, SchedulerState::Stopped);
        assert!(handle.status().last_pass.is_none());
        assert!(!root.path().join("docs/stuck.txt").exists());
    }
}
