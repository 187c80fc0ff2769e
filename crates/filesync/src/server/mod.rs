//! Axum HTTP server, routing, and middleware.
//!
//! # Responsibilities
//! - Define the Axum router with all routes and shared middleware.
//! - Expose the mirror tree read-only under `/mirror`.
//! - Gate the manual sync trigger to loopback callers.
//! - Inject shared application state (`AppState`) into handlers.
//!
//! # Module invariants
//! - Handlers never write to the mirror tree; only the scheduler's passes do.
//! - `POST /sync/now` never waits for a pass to finish.

pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
