//! Configuration loading and validation for the filesync service.
//!
//! Values are read from a YAML file (path in `FILESYNC_CONFIG`, default
//! `config.yml`) and then overridden by `FILESYNC__`-prefixed environment
//! variables, using `__` as the nesting separator
//! (e.g. `FILESYNC__SERVER__PORT=8443`). The process exits with a clear error
//! message if anything is missing or invalid, including unparsable cron
//! expressions and mirror entries.
//!
//! The `files` section is file-only and is parsed with `serde_yaml` straight
//! from the YAML text: its map keys become directory and file names, and the
//! layered `config` sources fold key case.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::mirror::{MirrorMapping, RawMirrorMapping};
use crate::schedule::{ScheduleSet, DEFAULT_FALLBACK_WAIT, DEFAULT_MIN_DELAY};
use crate::scheduler::SchedulerSettings;

/// Environment variable naming the YAML configuration file.
pub const CONFIG_PATH_VAR: &str = "FILESYNC_CONFIG";

/// Validated service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    /// Filled from the raw YAML by [`Config::from_yaml_str`].
    #[serde(skip)]
    pub files: FilesConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout applied to every route.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Mirror synchronisation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Cron expressions; the service wakes at the earliest upcoming one.
    #[serde(default)]
    pub schedule: Vec<String>,

    /// Directory the mirror tree is written to and served from.
    #[serde(default = "default_mirror_root")]
    pub mirror_root: PathBuf,

    /// Sleep used when no cron rule has a future occurrence.
    #[serde(default = "default_fallback_wait")]
    pub fallback_wait_secs: u64,

    /// Lower bound on every scheduler sleep.
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: u64,

    /// Timeout for each remote request, body included.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Upper bound on simultaneous downloads within a pass.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Run one pass immediately at startup instead of waiting for the schedule.
    #[serde(default)]
    pub run_on_startup: bool,

    /// How long an in-flight pass may run after a shutdown signal.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

/// Files the service is responsible for.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilesConfig {
    /// category → filename → URL. Keys are used verbatim as path components.
    #[serde(default)]
    pub mirror: RawMirrorMapping,

    /// Existing directory served read-only under `/public`.
    #[serde(default)]
    pub public: Option<PathBuf>,
}

/// Top-level shape used to pull `files` out of the YAML text.
#[derive(Debug, Default, Deserialize)]
struct FileSections {
    #[serde(default)]
    files: FilesConfig,
}

/// Logging and tracing settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Tracing log level (e.g. `"info"`, `"debug"`). `RUST_LOG` wins if set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional OTLP/gRPC endpoint spans are exported to.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_mirror_root() -> PathBuf {
    PathBuf::from("/data/mirror")
}
fn default_fallback_wait() -> u64 {
    DEFAULT_FALLBACK_WAIT.as_secs()
}
fn default_min_delay() -> u64 {
    DEFAULT_MIN_DELAY.as_secs()
}
fn default_fetch_timeout() -> u64 {
    100
}
fn default_max_concurrent_fetches() -> usize {
    4
}
fn default_shutdown_grace() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            schedule: Vec::new(),
            mirror_root: default_mirror_root(),
            fallback_wait_secs: default_fallback_wait(),
            min_delay_secs: default_min_delay(),
            fetch_timeout_secs: default_fetch_timeout(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            run_on_startup: false,
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

impl Config {
    /// Load and validate configuration from the YAML file and environment.
    ///
    /// A missing file is not an error as long as the environment supplies
    /// everything that has no default.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or parsed, or if
    /// validation fails.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| "config.yml".into());
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read configuration file {path}"))
            }
        };
        Self::from_yaml_str(&text).with_context(|| format!("failed to load configuration from {path}"))
    }

    /// Build from YAML text layered under `FILESYNC__*` environment variables.
    fn from_yaml_str(yaml: &str) -> Result<Self> {
        let has_file = !yaml.trim().is_empty();
        let mut builder = config::Config::builder();
        if has_file {
            builder = builder.add_source(config::File::from_str(yaml, config::FileFormat::Yaml));
        }
        let cfg = builder
            .add_source(config::Environment::with_prefix("FILESYNC").separator("__"))
            .build()
            .context("failed to build configuration")?;

        let mut c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        if has_file {
            let sections: Option<FileSections> =
                serde_yaml::from_str(yaml).context("failed to deserialise files section")?;
            c.files = sections.unwrap_or_default().files;
        }

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.sync.mirror_root.as_os_str().is_empty() {
            anyhow::bail!("sync.mirror_root must not be empty");
        }
        ensure_positive(self.server.request_timeout_secs, "server.request_timeout_secs")?;
        ensure_positive(self.sync.fallback_wait_secs, "sync.fallback_wait_secs")?;
        ensure_positive(self.sync.min_delay_secs, "sync.min_delay_secs")?;
        ensure_positive(self.sync.fetch_timeout_secs, "sync.fetch_timeout_secs")?;
        if self.sync.max_concurrent_fetches == 0 {
            anyhow::bail!("sync.max_concurrent_fetches must be > 0");
        }
        if let Some(endpoint) = &self.log.otlp_endpoint {
            if endpoint.trim().is_empty() {
                anyhow::bail!("log.otlp_endpoint must not be blank when set");
            }
        }

        if let Some(public) = &self.files.public {
            if !public.is_dir() {
                anyhow::bail!("files.public {} is not a directory", public.display());
            }
        }

        self.sync.schedule_set()?;
        self.files.mirror_mapping()?;
        Ok(())
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SyncConfig {
    /// Parse the configured cron expressions.
    pub fn schedule_set(&self) -> Result<ScheduleSet> {
        ScheduleSet::parse(&self.schedule).context("invalid sync.schedule")
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            fallback_wait: Duration::from_secs(self.fallback_wait_secs),
            min_delay: Duration::from_secs(self.min_delay_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            run_on_startup: self.run_on_startup,
        }
    }
}

impl FilesConfig {
    /// Validate the mirror mapping.
    pub fn mirror_mapping(&self) -> Result<MirrorMapping> {
        MirrorMapping::from_raw(&self.mirror).context("invalid files.mirror")
    }
}

fn ensure_positive(value: u64, name: &str) -> Result<()> {
    if value == 0 {
        anyhow::bail!("{name} must be > 0");
    }
    Ok(())
}
