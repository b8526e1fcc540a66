//! amlwatch API Server Entry Point
//!
//! Bootstraps configuration, connects the sources, warms the cache, starts
//! the daily refresh and serves HTTP until Ctrl-C.

use std::sync::Arc;

use amlwatch_api::telemetry::{init_tracing, TelemetryConfig};
use amlwatch_api::{cache_store, create_router, daily_update_task, ApiError, ApiResult, AppState, ServiceConfig};
use amlwatch_connectors::{ConnectorRegistry, SourceConfigFactory};
use amlwatch_storage::CacheManager;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let config = ServiceConfig::from_env()?;

    let store = cache_store(config.server.cache_backend, &config.redis)?;
    let cache = CacheManager::new(store, config.cache.health_timeout);
    tracing::info!(backend = cache.backend_name(), "Cache store configured");

    let factory = Arc::new(SourceConfigFactory::new(config.sources.clone()));
    let registry = Arc::new(ConnectorRegistry::new(factory));
    let connected = registry.connect_all().await;
    if connected.all_ok() {
        tracing::info!(sources = ?connected.succeeded, "All sources connected");
    } else {
        tracing::warn!(
            connected = ?connected.succeeded,
            failed = ?connected.failed,
            "Starting in degraded mode"
        );
    }

    let state = AppState::new(
        Arc::clone(&registry),
        cache,
        config.cache.clone(),
        config.retry.clone(),
    );

    if config.server.warm_on_start {
        let orchestrator = Arc::clone(&state.orchestrator);
        tokio::spawn(async move {
            let report = orchestrator.warm_all().await;
            tracing::info!(
                outcome = report.outcome(),
                elapsed_ms = report.elapsed_ms,
                "Initial cache warm finished"
            );
        });
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(daily_update_task(Arc::clone(&state.updater), shutdown_rx));

    let app = create_router(state, &config.server);
    let addr = config.server.bind_addr()?;
    tracing::info!(%addr, "Starting amlwatch API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.await {
        tracing::warn!(error = %e, "Daily update task did not stop cleanly");
    }

    let disconnected = registry.disconnect_all().await;
    tracing::info!(
        disconnected = ?disconnected.succeeded,
        failed = ?disconnected.failed,
        "Sources disconnected"
    );

    Ok(())
}
