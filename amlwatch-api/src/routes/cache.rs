//! Cache Operations
//!
//! Status, stats, operator-triggered refreshes and pattern invalidation.
//! Refresh and update triggers return immediately; the work runs in a
//! spawned task and is reported through logs and metrics.

use axum::{
    extract::State,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use amlwatch_storage::CacheStats;

use crate::error::{ApiError, ApiResult};
use crate::response::ApiResponse;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub healthy: bool,
    /// `operational` or `down`
    pub status: &'static str,
    pub last_checked: DateTime<Utc>,
    pub last_update: Option<DateTime<Utc>>,
    pub warming_in_progress: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAccepted {
    pub message: &'static str,
    /// A warm run held the gate when the trigger arrived
    pub already_running: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    #[serde(default)]
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateResult {
    pub pattern: String,
    pub removed: u64,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/cache/status
pub async fn status(State(state): State<AppState>) -> ApiResponse<CacheStatus> {
    let healthy = state.cache.is_healthy().await;
    ApiResponse::ok(CacheStatus {
        healthy,
        status: if healthy { "operational" } else { "down" },
        last_checked: Utc::now(),
        last_update: state.cache.last_update(),
        warming_in_progress: state.orchestrator.is_running(),
    })
}

/// GET /api/cache/stats
pub async fn stats(State(state): State<AppState>) -> ApiResult<ApiResponse<CacheStats>> {
    let stats = state.cache.stats().await?;
    Ok(ApiResponse::ok(stats))
}

/// POST /api/cache/refresh - warm the current window in the background
pub async fn refresh(State(state): State<AppState>) -> ApiResponse<TriggerAccepted> {
    let already_running = state.orchestrator.is_running();
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        orchestrator.warm_all().await;
    });
    info!(already_running, "Cache refresh requested");
    ApiResponse::accepted(TriggerAccepted {
        message: "Cache refresh started",
        already_running,
    })
}

/// POST /api/cache/trigger-update - run the daily update now
pub async fn trigger_update(State(state): State<AppState>) -> ApiResponse<TriggerAccepted> {
    let already_running = state.orchestrator.is_running();
    let updater = state.updater.clone();
    tokio::spawn(async move {
        updater.trigger_manual_update().await;
    });
    info!(already_running, "Manual daily update requested");
    ApiResponse::accepted(TriggerAccepted {
        message: "Daily update started",
        already_running,
    })
}

/// DELETE /api/cache/invalidate - `{ "pattern": "detections:*" }`
pub async fn invalidate(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> ApiResult<ApiResponse<InvalidateResult>> {
    let pattern = req.pattern.trim();
    if pattern.is_empty() {
        return Err(ApiError::missing_field("pattern"));
    }

    let removed = state.cache.invalidate_pattern(pattern).await?;
    info!(pattern, removed, "Cache invalidated by operator");
    Ok(ApiResponse::ok(InvalidateResult {
        pattern: pattern.to_string(),
        removed,
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/stats", get(stats))
        .route("/refresh", post(refresh))
        .route("/trigger-update", post(trigger_update))
        .route("/invalidate", delete(invalidate))
}
