//! Axum middleware applied to individual routes.
//!
//! Request tracing, timeouts and compression are applied router-wide in
//! [`super::router::build`]; this module holds the caller checks.

use std::net::{IpAddr, SocketAddr};

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
    middleware::Next,
    response::Response,
};
use common::ServiceError;
use tracing::warn;

use super::handlers::error_response;

/// Reject any caller whose peer address is not loopback with `403`.
///
/// The service must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()` for the peer address
/// to be available.
pub async fn require_loopback(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !is_loopback(peer.ip()) {
        warn!(%peer, path = %request.uri().path(), "rejected non-loopback caller");
        return error_response(&ServiceError::Forbidden(
            "this endpoint only accepts local callers".into(),
        ));
    }
    next.run(request).await
}

/// Loopback check that also accepts IPv4-mapped IPv6 loopback (`::ffff:127.0.0.1`).
fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback()),
    }
}
