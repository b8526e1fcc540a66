//! Data retrieval endpoints
//!
//! Thin wrappers over the domain services. Every handler resolves the date
//! window from `startDate`/`endDate` (both or neither; neither means the
//! current trailing window) and reads through the cache.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use amlwatch_core::kpi::{DatedCount, LabelCount};
use amlwatch_core::{DateWindow, DetectionKpis, GoamlKpis, Record, ScreeningKpis};

use crate::error::{ApiError, ApiResult};
use crate::response::{ApiResponse, ResponseMetadata};
use crate::state::AppState;

// ============================================================================
// WINDOW QUERY
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl WindowQuery {
    /// Requested window, or `current` when no bounds are given.
    pub fn resolve(&self, current: DateWindow) -> ApiResult<DateWindow> {
        fn present(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        match (present(&self.start_date), present(&self.end_date)) {
            (None, None) => Ok(current),
            (Some(start), Some(end)) => Ok(DateWindow::parse(start, end)?),
            (Some(_), None) => Err(ApiError::missing_field("endDate")),
            (None, Some(_)) => Err(ApiError::missing_field("startDate")),
        }
    }
}

fn window_for(state: &AppState, query: &WindowQuery) -> ApiResult<DateWindow> {
    query.resolve(state.orchestrator.current_window())
}

fn snapshot<T: Serialize>(data: T, window: &DateWindow) -> ApiResponse<T> {
    ApiResponse::ok(data).with_metadata(ResponseMetadata::cache(window))
}

type Records = ApiResult<ApiResponse<Vec<Record>>>;
type Trend = ApiResult<ApiResponse<Vec<DatedCount>>>;
type Distribution = ApiResult<ApiResponse<Vec<LabelCount>>>;

// ============================================================================
// DETECTIONS
// ============================================================================

pub async fn detections(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> Records {
    let window = window_for(&state, &q)?;
    let records = state.detections.get_records(&window).await?;
    Ok(ApiResponse::list(records, &window))
}

pub async fn detections_by_scenario(
    State(state): State<AppState>,
    Path(scenario): Path<String>,
    Query(q): Query<WindowQuery>,
) -> Records {
    let window = window_for(&state, &q)?;
    let records = state.detections.by_scenario(&scenario, &window).await?;
    Ok(ApiResponse::list(records, &window))
}

pub async fn detections_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
    Query(q): Query<WindowQuery>,
) -> Records {
    let window = window_for(&state, &q)?;
    let records = state.detections.by_status(&status, &window).await?;
    Ok(ApiResponse::list(records, &window))
}

pub async fn detection_kpis(
    State(state): State<AppState>,
    Query(q): Query<WindowQuery>,
) -> ApiResult<ApiResponse<DetectionKpis>> {
    let window = window_for(&state, &q)?;
    let kpis = state.detections.kpis(&window).await?;
    Ok(snapshot(kpis, &window))
}

pub async fn detection_trends(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> Trend {
    let window = window_for(&state, &q)?;
    let trend = state.detections.alert_trends(&window).await?;
    Ok(ApiResponse::list(trend, &window))
}

pub async fn detection_scenarios(
    State(state): State<AppState>,
    Query(q): Query<WindowQuery>,
) -> Distribution {
    let window = window_for(&state, &q)?;
    let dist = state.detections.scenario_distribution(&window).await?;
    Ok(ApiResponse::list(dist, &window))
}

pub async fn detection_statuses(
    State(state): State<AppState>,
    Query(q): Query<WindowQuery>,
) -> Distribution {
    let window = window_for(&state, &q)?;
    let dist = state.detections.status_distribution(&window).await?;
    Ok(ApiResponse::list(dist, &window))
}

// ============================================================================
// SCREENING
// ============================================================================

pub async fn screening(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> Records {
    let window = window_for(&state, &q)?;
    let records = state.screening.get_records(&window).await?;
    Ok(ApiResponse::list(records, &window))
}

pub async fn screening_relational(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> Records {
    let window = window_for(&state, &q)?;
    let records = state.screening.relational_records(&window).await?;
    Ok(ApiResponse::list(records, &window))
}

pub async fn screening_sheet(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> Records {
    let window = window_for(&state, &q)?;
    let records = state.screening.sheet_records(&window).await?;
    Ok(ApiResponse::list(records, &window))
}

pub async fn screening_onboarding(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> Records {
    let window = window_for(&state, &q)?;
    let records = state.screening.onboarding_alerts(&window).await?;
    Ok(ApiResponse::list(records, &window))
}

/// One row per customer across both screening sources.
pub async fn screening_combined(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> Records {
    let window = window_for(&state, &q)?;
    let records = state.screening.merged_by_customer(&window).await?;
    Ok(ApiResponse::list(records, &window))
}

pub async fn screening_kpis(
    State(state): State<AppState>,
    Query(q): Query<WindowQuery>,
) -> ApiResult<ApiResponse<ScreeningKpis>> {
    let window = window_for(&state, &q)?;
    let kpis = state.screening.kpis(&window).await?;
    Ok(snapshot(kpis, &window))
}

pub async fn screening_trends(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> Trend {
    let window = window_for(&state, &q)?;
    let trend = state.screening.trends(&window).await?;
    Ok(ApiResponse::list(trend, &window))
}

// ============================================================================
// GOAML
// ============================================================================

pub async fn goaml(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> Records {
    let window = window_for(&state, &q)?;
    let records = state.goaml.get_records(&window).await?;
    Ok(ApiResponse::list(records, &window))
}

pub async fn goaml_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
    Query(q): Query<WindowQuery>,
) -> Records {
    let window = window_for(&state, &q)?;
    let records = state.goaml.by_status(&status, &window).await?;
    Ok(ApiResponse::list(records, &window))
}

pub async fn goaml_by_reporter(
    State(state): State<AppState>,
    Path(reporter): Path<String>,
    Query(q): Query<WindowQuery>,
) -> Records {
    let window = window_for(&state, &q)?;
    let records = state.goaml.by_reporter(&reporter, &window).await?;
    Ok(ApiResponse::list(records, &window))
}

pub async fn goaml_kpis(
    State(state): State<AppState>,
    Query(q): Query<WindowQuery>,
) -> ApiResult<ApiResponse<GoamlKpis>> {
    let window = window_for(&state, &q)?;
    let kpis = state.goaml.kpis(&window).await?;
    Ok(snapshot(kpis, &window))
}

pub async fn goaml_trends(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> Trend {
    let window = window_for(&state, &q)?;
    let trend = state.goaml.trends(&window).await?;
    Ok(ApiResponse::list(trend, &window))
}

pub async fn goaml_reporters(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> Distribution {
    let window = window_for(&state, &q)?;
    let dist = state.goaml.reporter_stats(&window).await?;
    Ok(ApiResponse::list(dist, &window))
}

pub async fn goaml_statuses(State(state): State<AppState>, Query(q): Query<WindowQuery>) -> Distribution {
    let window = window_for(&state, &q)?;
    let dist = state.goaml.status_distribution(&window).await?;
    Ok(ApiResponse::list(dist, &window))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/detections", get(detections))
        .route("/detections/kpis", get(detection_kpis))
        .route("/detections/trends", get(detection_trends))
        .route("/detections/scenario/:scenario", get(detections_by_scenario))
        .route("/detections/status/:status", get(detections_by_status))
        .route("/detections/distribution/scenarios", get(detection_scenarios))
        .route("/detections/distribution/statuses", get(detection_statuses))
        .route("/screening", get(screening))
        .route("/screening/oracle", get(screening_relational))
        .route("/screening/sheet", get(screening_sheet))
        .route("/screening/onboarding", get(screening_onboarding))
        .route("/screening/combined", get(screening_combined))
        .route("/screening/kpis", get(screening_kpis))
        .route("/screening/trends", get(screening_trends))
        .route("/goaml", get(goaml))
        .route("/goaml/kpis", get(goaml_kpis))
        .route("/goaml/trends", get(goaml_trends))
        .route("/goaml/status/:status", get(goaml_by_status))
        .route("/goaml/reporter/:reporter", get(goaml_by_reporter))
        .route("/goaml/reporters", get(goaml_reporters))
        .route("/goaml/distribution", get(goaml_statuses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::NaiveDate;

    fn current() -> DateWindow {
        DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        )
        .unwrap()
    }

    fn query(start: Option<&str>, end: Option<&str>) -> WindowQuery {
        WindowQuery {
            start_date: start.map(String::from),
            end_date: end.map(String::from),
        }
    }

    #[test]
    fn test_no_bounds_uses_current_window() {
        assert_eq!(query(None, None).resolve(current()).unwrap(), current());
        assert_eq!(query(Some(" "), Some("")).resolve(current()).unwrap(), current());
    }

    #[test]
    fn test_explicit_bounds_are_parsed() {
        let window = query(Some("2024-01-01"), Some("2024-03-31"))
            .resolve(current())
            .unwrap();
        assert_eq!(window.start(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(window.end(), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
    }

    #[test]
    fn test_one_sided_window_is_rejected() {
        let err = query(Some("2024-01-01"), None).resolve(current()).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingField);
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        let err = query(Some("2024-03-31"), Some("2024-01-01"))
            .resolve(current())
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
