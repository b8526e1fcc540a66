//! Data source health: per-source connectivity, connector details, pool
//! occupancy and configuration failures.

use axum::{extract::State, routing::get, Router};
use serde::Serialize;

use amlwatch_connectors::{ConnectorInfo, PoolStats, SourceId};
use amlwatch_core::HealthStatus;

use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealth {
    pub id: SourceId,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<ConnectorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolStats>,
    /// Why the source could not be configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourcesHealth {
    /// Rollup over sources only
    pub status: HealthStatus,
    pub sources: Vec<SourceHealth>,
}

/// GET /api/config/datasources/health
pub async fn datasources_health(State(state): State<AppState>) -> ApiResponse<DataSourcesHealth> {
    let registry = &state.registry;
    let (health, infos, mut pools) = tokio::join!(
        registry.health_all(),
        registry.describe_all(),
        registry.pool_stats_all()
    );
    let mut failures = registry.config_failures();

    let sources: Vec<SourceHealth> = health
        .iter()
        .map(|(&id, &healthy)| SourceHealth {
            id,
            healthy,
            info: infos.iter().find(|info| info.id == id).cloned(),
            pool: pools.remove(&id),
            error: failures.remove(&id),
        })
        .collect();

    ApiResponse::ok(DataSourcesHealth {
        status: HealthStatus::rollup(true, health.values().copied()),
        sources,
    })
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/health", get(datasources_health))
}
