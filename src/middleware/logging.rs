//! Access log middleware.
//!
//! One line per request with method, path, status and latency. Error
//! responses built by the auth layer carry a [`RejectionReason`] extension,
//! so refused logins and gateway rejections show up with their cause.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};

const HEALTH_PATH: &str = "/health";

/// Short machine-readable cause attached to failure responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectionReason(pub &'static str);

pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    // Health probes would drown out everything else
    if request.uri().path() == HEALTH_PATH {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status();
    let reason = response
        .extensions()
        .get::<RejectionReason>()
        .map(|r| r.0)
        .unwrap_or("-");

    if status.is_server_error() {
        warn!(%method, %path, status = status.as_u16(), reason, latency_ms, "Request failed");
    } else if status == StatusCode::UNAUTHORIZED {
        info!(%method, %path, status = status.as_u16(), reason, latency_ms, "Request unauthorized");
    } else if status.is_client_error() {
        info!(%method, %path, status = status.as_u16(), reason, latency_ms, "Request rejected");
    } else {
        info!(%method, %path, status = status.as_u16(), latency_ms, "Request completed");
    }

    response
}
