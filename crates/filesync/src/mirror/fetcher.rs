//! Conditional download of a single remote resource into a local file.
//!
//! The local file's modification time is the only freshness state: it is sent
//! as `If-Modified-Since`, and a `304 Not Modified` leaves the file alone.
//! New content is written to a hidden temporary file next to the target and
//! renamed over it, so readers never observe a partial file.

use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use chrono::{DateTime, Utc};
use reqwest::{header::IF_MODIFIED_SINCE, Client, StatusCode, Url};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

/// Result of a successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The remote reported no change; nothing was written.
    NotModified,
    /// The local file was replaced with `bytes` bytes of new content.
    Updated { bytes: u64 },
}

/// Per-entry failures. Never fatal to a pass.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure: DNS, connect, TLS, timeout, truncated body.
    #[error("request to {url} failed: {source}")]
    Request {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    /// The remote answered with a status other than 2xx or 304.
    #[error("{url} answered with HTTP {status}")]
    Status { url: Url, status: StatusCode },

    /// The category directory could not be created.
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The downloaded content could not be written to disk.
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Performs conditional GETs over a pooled HTTP client.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ResourceFetcher {
    client: Client,
}

impl ResourceFetcher {
    /// Build a fetcher whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("filesync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Refresh `local_path` from `url`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on transport failures, non-success statuses and
    /// local write failures. The existing local file is untouched in every
    /// error case.
    pub async fn fetch(&self, local_path: &Path, url: &Url) -> Result<FetchOutcome, FetchError> {
        let mut request = self.client.get(url.clone());
        if let Some(modified) = local_modified(local_path).await {
            request = request.header(IF_MODIFIED_SINCE, http_date(modified));
        }

        let response = request.send().await.map_err(|source| FetchError::Request {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            debug!(path = %local_path.display(), %url, "no update");
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.clone(),
                status,
            });
        }

        let body = response.bytes().await.map_err(|source| FetchError::Request {
            url: url.clone(),
            source,
        })?;

        write_atomic(local_path, &body)
            .await
            .map_err(|source| FetchError::Write {
                path: local_path.to_owned(),
                source,
            })?;

        info!(path = %local_path.display(), %url, bytes = body.len(), "updated");
        Ok(FetchOutcome::Updated {
            bytes: body.len() as u64,
        })
    }
}

/// Modification time of `path`, or `None` if it does not exist or the
/// platform cannot report one (the fetch then falls back to an unconditional GET).
async fn local_modified(path: &Path) -> Option<SystemTime> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    if !meta.is_file() {
        return None;
    }
    meta.modified().ok()
}

/// Format `t` as an IMF-fixdate (RFC 9110 §5.6.7).
pub(crate) fn http_date(t: SystemTime) -> String {
    DateTime::<Utc>::from(t)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Write `data` to a unique temporary sibling of `path`, then rename it into place.
async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = temp_path_for(path);
    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
}
