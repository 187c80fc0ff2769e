//! Structured logging and optional span export.
//!
//! Logs are emitted as JSON lines on stdout. If `log.otlp_endpoint` is set,
//! spans are also exported via OTLP/gRPC to a collector.
//!
//! # Telemetry invariants
//!
//! - Log level is configurable via `log.level` (default: `info`) or `RUST_LOG`.
//! - Every pass logs its start and its tally; per-file failures are logged
//!   with the category, local path, and URL involved.

pub mod init;

pub use init::{init_telemetry, shutdown_telemetry};
