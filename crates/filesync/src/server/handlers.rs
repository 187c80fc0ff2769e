//! Axum request handlers for all service endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{
    protocol::{ErrorResponse, HealthResponse, PassSummary, SyncAcceptedResponse},
    ServiceError,
};
use tracing::{info, warn};

use super::state::AppState;
use crate::scheduler::SchedulerState;

/// `POST /sync/now`: queue a pass and return without waiting for it.
///
/// Returns `202 Accepted` with the acceptance time, or `503` once the
/// scheduler has stopped. Loopback-only; see
/// [`super::middleware::require_loopback`].
pub async fn sync_now(State(state): State<AppState>) -> Response {
    match state.sync.trigger() {
        Ok(ack) => {
            info!(accepted_at = %ack.accepted_at, "manual sync accepted");
            (
                StatusCode::ACCEPTED,
                Json(SyncAcceptedResponse::new(ack.accepted_at)),
            )
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "manual sync rejected");
            error_response(&e)
        }
    }
}

/// `GET /health`: liveness check plus scheduler status.
///
/// Returns `200 OK` while the scheduler is idle or running and
/// `503 Service Unavailable` once it has stopped.
pub async fn health(State(state): State<AppState>) -> Response {
    let status = state.sync.status();

    let (status_code, status_str) = match status.state {
        SchedulerState::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "stopped"),
        _ => (StatusCode::OK, "ok"),
    };
    let next_run = match status.state {
        SchedulerState::Idle { next_run } => Some(next_run),
        _ => None,
    };

    let body = HealthResponse {
        status: status_str.into(),
        scheduler: status.state.as_str().into(),
        next_run,
        last_pass: status.last_pass.as_ref().map(PassSummary::from),
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

/// Render a [`ServiceError`] as its status code and JSON body.
pub(super) fn error_response(err: &ServiceError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorResponse::from(err))).into_response()
}
