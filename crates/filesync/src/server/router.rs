//! Axum router construction.

use std::{path::Path, time::Duration};

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer, services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer,
};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
///
/// - `POST /sync/now` (loopback callers only)
/// - `GET /health`
/// - `GET /mirror/<category>/<filename>` served from `mirror_root`
/// - `GET /public/...` served from `public_root`, when configured
pub fn build(
    state: AppState,
    mirror_root: &Path,
    public_root: Option<&Path>,
    request_timeout: Duration,
) -> Router {
    let mut router = Router::new()
        .route(
            "/sync/now",
            post(handlers::sync_now).route_layer(from_fn(middleware::require_loopback)),
        )
        .route("/health", get(handlers::health))
        .nest_service("/mirror", ServeDir::new(mirror_root));
    if let Some(public) = public_root {
        router = router.nest_service("/public", ServeDir::new(public));
    }

    router
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CompressionLayer::new())
        .with_state(state)
}
