//! HTTP Routes
//!
//! - `/health`, `/health/ready`: liveness and readiness
//! - `/metrics`: Prometheus exposition
//! - `/api/cache/*`: cache status, stats, refresh triggers, invalidation
//! - `/api/config/datasources/health`: per-source health
//! - `/api/data/*`: cache-aside domain reads

pub mod cache;
pub mod data;
pub mod datasources;
pub mod health;

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    routing::get,
    Router,
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

/// Build the full router around `state`.
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .nest("/health", health::create_router())
        .nest("/api/cache", cache::create_router())
        .nest("/api/config/datasources", datasources::create_router())
        .nest("/api/data", data::create_router())
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(ConcurrencyLimitLayer::new(config.max_concurrent_requests))
        .layer(build_cors_layer(config))
}

fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: restricting origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}
