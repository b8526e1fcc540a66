//! Health Check Endpoints
//!
//! - /health - Cache and every source, rolled up
//! - /health/ready - Cache reachability only
//!
//! The cache is the only hard dependency: a down source degrades the
//! service but does not make it unready.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::time::Instant;

use amlwatch_core::{HealthCheck, HealthStatus};

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub checks: Vec<HealthCheck>,
}

fn status_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();
    let cache_ok = state.cache.is_healthy().await;
    let cache_check = HealthCheck::from_probe(format!("cache:{}", state.cache.backend_name()), cache_ok)
        .with_response_time(started.elapsed().as_millis() as i64);

    let sources = state.registry.health_all().await;
    let status = HealthStatus::rollup(cache_ok, sources.values().copied());

    let mut checks = vec![cache_check];
    checks.extend(
        sources
            .iter()
            .map(|(id, ok)| HealthCheck::from_probe(format!("source:{}", id), *ok)),
    );

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        checks,
    };
    (status_code(status), Json(response))
}

/// GET /health/ready
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let cache_ok = state.cache.is_healthy().await;
    let status = HealthStatus::rollup(cache_ok, std::iter::empty());
    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        checks: vec![HealthCheck::from_probe("cache", cache_ok)],
    };
    (status_code(status), Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route("/ready", get(readiness))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_is_still_served() {
        assert_eq!(status_code(HealthStatus::Degraded), StatusCode::OK);
        assert_eq!(status_code(HealthStatus::Unhealthy), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            version: "0.1.0".to_string(),
            uptime_seconds: 5,
            checks: vec![HealthCheck::healthy("cache")],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["uptimeSeconds"], 5);
    }
}
