//! Mirror tree maintenance: mapping validation, conditional fetches, and passes.
//!
//! # Responsibilities
//!
//! - Validate the configured category → filename → URL mapping at startup.
//! - Refresh each `<mirror root>/<category>/<filename>` from its URL using
//!   `If-Modified-Since`, writing new content atomically.
//! - Run full passes over the mapping where one failing entry never blocks the
//!   others.
//!
//! # Module invariants
//!
//! - **No sidecar metadata.** Freshness is the local file's modification time.
//! - **One pass at a time.** [`MirrorSynchronizer::run_pass`] holds a pass lock
//!   for its whole duration.

pub mod fetcher;
pub mod mapping;
pub mod synchronizer;

pub use fetcher::ResourceFetcher;
pub use mapping::{MirrorMapping, RawMirrorMapping};
pub use synchronizer::{MirrorSynchronizer, PassReport};
