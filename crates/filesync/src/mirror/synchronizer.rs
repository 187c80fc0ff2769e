//! One full pass over the mirror mapping.

use std::{path::PathBuf, time::Instant};

use chrono::{DateTime, Utc};
use common::protocol::PassSummary;
use tokio::{sync::Mutex, task::JoinSet};
use tracing::{error, info};

use super::{
    fetcher::{FetchError, FetchOutcome, ResourceFetcher},
    mapping::{MirrorEntry, MirrorMapping},
};

/// Tally of one completed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl From<&PassReport> for PassSummary {
    fn from(r: &PassReport) -> Self {
        Self {
            started_at: r.started_at,
            finished_at: r.finished_at,
            updated: r.updated,
            unchanged: r.unchanged,
            failed: r.failed,
        }
    }
}

/// Owns the mirror root for writes and refreshes every configured entry.
///
/// Concurrent callers of [`run_pass`](Self::run_pass) are serialised: at most
/// one pass touches the mirror tree at a time.
#[derive(Debug)]
pub struct MirrorSynchronizer {
    root: PathBuf,
    mapping: MirrorMapping,
    fetcher: ResourceFetcher,
    max_concurrent_fetches: usize,
    pass_lock: Mutex<()>,
}

impl MirrorSynchronizer {
    pub fn new(
        root: PathBuf,
        mapping: MirrorMapping,
        fetcher: ResourceFetcher,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            root,
            mapping,
            fetcher,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
            pass_lock: Mutex::new(()),
        }
    }

    /// Attempt every entry once and report the outcome.
    ///
    /// Per-entry failures are logged and counted; they never stop the pass.
    pub async fn run_pass(&self) -> PassReport {
        let _pass = self.pass_lock.lock().await;

        let started_at = Utc::now();
        let clock = Instant::now();
        let mut pending = self.mapping.entries(&self.root).into_iter();
        info!(entries = self.mapping.len(), root = %self.root.display(), "starting synchronization");

        let mut report = PassReport {
            started_at,
            finished_at: started_at,
            updated: 0,
            unchanged: 0,
            failed: 0,
        };

        let mut tasks = JoinSet::new();
        for entry in pending.by_ref().take(self.max_concurrent_fetches) {
            tasks.spawn(sync_entry(self.fetcher.clone(), entry));
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(FetchOutcome::Updated { .. }))) => report.updated += 1,
                Ok((_, Ok(FetchOutcome::NotModified))) => report.unchanged += 1,
                Ok((entry, Err(e))) => {
                    error!(
                        category = %entry.category,
                        path = %entry.local_path.display(),
                        url = %entry.url,
                        error = %e,
                        "error syncing file"
                    );
                    report.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "sync task panicked");
                    report.failed += 1;
                }
            }
            if let Some(entry) = pending.next() {
                tasks.spawn(sync_entry(self.fetcher.clone(), entry));
            }
        }

        report.finished_at = Utc::now();
        info!(
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            elapsed_ms = clock.elapsed().as_millis() as u64,
            "synchronization finished"
        );
        report
    }
}

async fn sync_entry(
    fetcher: ResourceFetcher,
    entry: MirrorEntry,
) -> (MirrorEntry, Result<FetchOutcome, FetchError>) {
    let result = async {
        if let Some(dir) = entry.local_path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| FetchError::CreateDir {
                    path: dir.to_owned(),
                    source,
                })?;
        }
        fetcher.fetch(&entry.local_path, &entry.url).await
    }
    .await;
    (entry, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::mapping::RawMirrorMapping;
    use std::{path::Path, time::Duration};
    use tempfile::TempDir;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn synchronizer(root: &Path, entries: &[(&str, &str, String)]) -> MirrorSynchronizer {
        let mut raw = RawMirrorMapping::new();
        for (category, filename, url) in entries {
            raw.entry((*category).to_owned())
                .or_default()
                .insert((*filename).to_owned(), url.clone());
        }
        MirrorSynchronizer::new(
            root.to_owned(),
            MirrorMapping::from_raw(&raw).unwrap(),
            ResourceFetcher::new(Duration::from_secs(5)).unwrap(),
            4,
        )
    }

    /// 200 for unconditional requests, 304 once the client has a local copy.
    async fn mount_conditional(server: &MockServer, p: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(p))
            .and(header_exists("if-modified-since"))
            .respond_with(ResponseTemplate::new(304))
            .with_priority(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .with_priority(2)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn first_pass_creates_category_tree() {
        let server = MockServer::start().await;
        mount_conditional(&server, "/readme.txt", "read me").await;

        let root = TempDir::new().unwrap();
        let sync = synchronizer(
            root.path(),
            &[("docs", "readme.txt", format!("{}/readme.txt", server.uri()))],
        );
        let report = sync.run_pass().await;

        assert_eq!((report.updated, report.unchanged, report.failed), (1, 0, 0));
        assert!(report.finished_at >= report.started_at);
        let written = root.path().join("docs").join("readme.txt");
        assert_eq!(std::fs::read_to_string(written).unwrap(), "read me");
    }

    #[tokio::test]
    async fn second_pass_with_unchanged_remote_writes_nothing() {
        let server = MockServer::start().await;
        mount_conditional(&server, "/readme.txt", "read me").await;

        let root = TempDir::new().unwrap();
        let sync = synchronizer(
            root.path(),
            &[("docs", "readme.txt", format!("{}/readme.txt", server.uri()))],
        );

        let first = sync.run_pass().await;
        let local = root.path().join("docs/readme.txt");
        let mtime = std::fs::metadata(&local).unwrap().modified().unwrap();

        let second = sync.run_pass().await;

        assert_eq!(first.updated, 1);
        assert_eq!((second.updated, second.unchanged), (0, 1));
        assert_eq!(std::fs::metadata(&local).unwrap().modified().unwrap(), mtime);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].headers.get("if-modified-since").is_none());
        assert!(requests[1].headers.get("if-modified-since").is_some());
    }

    #[tokio::test]
    async fn one_broken_url_does_not_block_the_rest() {
        let server = MockServer::start().await;
        mount_conditional(&server, "/a.txt", "a").await;
        mount_conditional(&server, "/b.txt", "b").await;
        mount_conditional(&server, "/c.txt", "c").await;

        let root = TempDir::new().unwrap();
        let sync = synchronizer(
            root.path(),
            &[
                ("docs", "a.txt", format!("{}/a.txt", server.uri())),
                ("docs", "b.txt", format!("{}/b.txt", server.uri())),
                ("misc", "c.txt", format!("{}/c.txt", server.uri())),
                ("misc", "dead.txt", "http://127.0.0.1:9/dead.txt".to_owned()),
            ],
        );
        let report = sync.run_pass().await;

        assert_eq!((report.updated, report.failed), (3, 1));
        assert!(root.path().join("docs/a.txt").exists());
        assert!(root.path().join("docs/b.txt").exists());
        assert!(root.path().join("misc/c.txt").exists());
        assert!(!root.path().join("misc/dead.txt").exists());
    }

    #[tokio::test]
    async fn http_errors_are_counted_as_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        mount_conditional(&server, "/ok", "ok").await;

        let root = TempDir::new().unwrap();
        let sync = synchronizer(
            root.path(),
            &[
                ("x", "missing", format!("{}/missing", server.uri())),
                ("x", "ok", format!("{}/ok", server.uri())),
            ],
        );
        let report = sync.run_pass().await;

        assert_eq!((report.updated, report.failed), (1, 1));
    }

    #[tokio::test]
    async fn concurrent_callers_never_overlap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_exists("if-modified-since"))
            .respond_with(ResponseTemplate::new(304))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow")
                    .set_delay(Duration::from_millis(300)),
            )
            .with_priority(2)
            .mount(&server)
            .await;

        let root = TempDir::new().unwrap();
        let sync = synchronizer(
            root.path(),
            &[("docs", "slow.txt", format!("{}/slow.txt", server.uri()))],
        );

        let (a, b) = tokio::join!(sync.run_pass(), sync.run_pass());

        // Had the passes overlapped, both would have seen no local file and
        // downloaded it. Serialised, the second one sends a conditional GET.
        assert_eq!(a.updated + b.updated, 1);
        assert_eq!(a.unchanged + b.unchanged, 1);
    }

    #[tokio::test]
    async fn bounded_concurrency_still_visits_every_entry() {
        let server = MockServer::start().await;
        mount_conditional(&server, "/f", "f").await;

        let root = TempDir::new().unwrap();
        let entries: Vec<(String, String)> =
            (0..10).map(|i| (format!("cat{}", i % 3), format!("file{i}"))).collect();
        let borrowed: Vec<(&str, &str, String)> = entries
            .iter()
            .map(|(c, f)| (c.as_str(), f.as_str(), format!("{}/f", server.uri())))
            .collect();

        let mut sync = synchronizer(root.path(), &borrowed);
        sync.max_concurrent_fetches = 1;
        let report = sync.run_pass().await;

        assert_eq!(report.updated, 10);
        assert_eq!(server.received_requests().await.unwrap().len(), 10);
    }
}
