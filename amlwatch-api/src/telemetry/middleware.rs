//! Axum middleware recording per-request metrics.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use super::metrics::metrics;

/// Records method, matched route and status for every request.
///
/// The route template is used as the path label, so query strings and path
/// parameters never reach Prometheus.
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    let status = response.status();
    let duration = start.elapsed();
    if let Some(m) = metrics() {
        m.record_http_request(method.as_str(), &path, status.as_u16(), duration.as_secs_f64());
    }
    if status.is_server_error() {
        tracing::warn!(method = %method, path = %path, status = status.as_u16(), duration_ms = duration.as_millis() as u64, "Request failed");
    } else {
        tracing::debug!(method = %method, path = %path, status = status.as_u16(), duration_ms = duration.as_millis() as u64, "Request completed");
    }

    response
}
