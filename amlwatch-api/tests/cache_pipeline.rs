//! End-to-end behavior of the cache-aside services, the warming
//! orchestrator and the daily update over stub sources and an in-memory
//! cache.

use amlwatch_api::{AppState, WarmableDomain};
use amlwatch_core::keys::{aggregates_key, detections_key, goaml_key, screening_key};
use amlwatch_core::record::rows_to_records;
use amlwatch_core::{AggregateKind, ScreeningSource};
use amlwatch_test_utils::{
    query_error, records, timeout_error, window, CacheKey, Domain, RetryConfig, SheetTab,
    SourceId, StubConnector, StubSources, TestStack,
};
use serde_json::{json, Value};
use std::time::Duration;

fn detection_rows() -> Vec<amlwatch_test_utils::Record> {
    records([
        json!({"ID": 1, "SCENARIO_NAME": "CO", "STATUS": "New", "DETECTION_DATE": "2024-01-05"}),
        json!({"ID": 2, "SCENARIO_NAME": "PEP", "STATUS": "Delayed", "DETECTION_DATE": "2024-02-11"}),
        json!({"ID": 3, "SCENARIO_NAME": "CO", "STATUS": "Sent SAR", "DETECTION_DATE": "2024-02-11"}),
    ])
}

fn screening_rows() -> Vec<amlwatch_test_utils::Record> {
    records([
        json!({"ID": 10, "CUSTOMER_ID": "C1", "STATUS": "Pending", "SCREENING_DATE": "2024-02-01"}),
        json!({"ID": 11, "CUSTOMER_ID": "C2", "STATUS": "Alert", "HIT_TYPE": "PEP", "SCREENING_DATE": "2024-02-02"}),
    ])
}

fn sheet_screening_rows() -> Vec<amlwatch_test_utils::Record> {
    records([
        json!({"customer_id": "C1", "STATUS": "Completed", "screening_date": "2024-02-03"}),
        json!({"customer_id": "C9", "STATUS": "Pending", "screening_date": "2025-01-01"}),
    ])
}

fn goaml_rows() -> Vec<amlwatch_test_utils::Record> {
    records([
        json!({"report_date": "2024-01-15", "status": "Submitted", "reporter": "ops"}),
        json!({"report_date": "2024-02-20", "status": "Draft", "reporter": "ops"}),
        json!({"report_date": "2024-03-02", "status": "Pending", "reporter": "mlro"}),
    ])
}

fn sources() -> StubSources {
    StubSources::new(
        StubConnector::new(SourceId::AmlDb).with_records(detection_rows()),
        StubConnector::new(SourceId::ScreeningDb).with_records(screening_rows()),
        StubConnector::new(SourceId::Sheets)
            .with_tab(SheetTab::Screening, sheet_screening_rows())
            .with_tab(SheetTab::Goaml, goaml_rows()),
    )
}

fn app(stack: &TestStack) -> AppState {
    AppState::new(
        stack.registry.clone(),
        stack.cache.clone(),
        stack.settings.clone(),
        RetryConfig::none(),
    )
}

async fn raw(stack: &TestStack, key: &CacheKey) -> Option<String> {
    use amlwatch_storage::CacheStore;
    stack.store.get_raw(key.as_str()).await.unwrap()
}

// ============================================================================
// CACHE-ASIDE
// ============================================================================

#[tokio::test]
async fn test_second_read_is_served_from_cache() {
    let sources = sources();
    let stack = sources.stack();
    let state = app(&stack);
    let w = window("2024-01-01", "2024-03-31");

    let first = state.detections.get_records(&w).await.unwrap();
    let second = state.detections.get_records(&w).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    assert_eq!(sources.aml_db.query_count(), 1);
}

#[tokio::test]
async fn test_filtered_reads_reuse_the_cached_records() {
    let sources = sources();
    let stack = sources.stack();
    let state = app(&stack);
    let w = window("2024-01-01", "2024-03-31");

    let co = state.detections.by_scenario("CO", &w).await.unwrap();
    let delayed = state.detections.by_status("Delayed", &w).await.unwrap();
    let trend = state.detections.alert_trends(&w).await.unwrap();

    assert_eq!(co.len(), 2);
    assert_eq!(delayed.len(), 1);
    assert_eq!(trend.len(), 2);
    assert_eq!(sources.aml_db.query_count(), 1);
}

#[tokio::test]
async fn test_failed_load_is_not_cached() {
    let sources = sources();
    sources.aml_db.fail_with(query_error(SourceId::AmlDb));
    let stack = sources.stack();
    let state = app(&stack);
    let w = window("2024-01-01", "2024-03-31");

    assert!(state.detections.get_records(&w).await.is_err());
    assert!(raw(&stack, &detections_key(&w, None)).await.is_none());

    sources.aml_db.recover();
    let records = state.detections.get_records(&w).await.unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(sources.aml_db.query_count(), 2);
}

#[tokio::test]
async fn test_detection_kpis_from_three_statuses() {
    let sources = sources();
    let stack = sources.stack();
    let state = app(&stack);
    let w = window("2024-01-01", "2024-03-31");

    let kpis = state.detections.kpis(&w).await.unwrap();
    assert_eq!(kpis.alert_count, 3);
    assert_eq!(kpis.pending_count, 1);
    assert_eq!(kpis.delayed_count, 1);
    assert_eq!(kpis.sent_sar_count, 1);
    assert_eq!(kpis.processed_alerts_count, 1);
    assert_eq!(kpis.pending_sar_count, 1);

    assert!(raw(&stack, &aggregates_key(AggregateKind::Detections, &w)).await.is_some());
}

#[tokio::test]
async fn test_sheet_rows_outside_window_are_dropped() {
    let rows: Vec<Vec<Value>> = vec![
        vec![json!("date"), json!("status")],
        vec![json!("2024-02-01"), json!("Submitted")],
        vec![json!("2024-04-01"), json!("Submitted")],
    ];
    let sources = StubSources::new(
        StubConnector::new(SourceId::AmlDb),
        StubConnector::new(SourceId::ScreeningDb),
        StubConnector::new(SourceId::Sheets).with_tab(SheetTab::Goaml, rows_to_records(&rows)),
    );
    let stack = sources.stack();
    let state = app(&stack);
    let w = window("2024-01-01", "2024-03-31");

    let reports = state.goaml.get_records(&w).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["date"], "2024-02-01");

    let kpis = state.goaml.kpis(&w).await.unwrap();
    assert_eq!(kpis.total_reports, 1);
    assert_eq!(kpis.submitted_reports, 1);
}

#[tokio::test]
async fn test_screening_is_cached_per_source_and_combined() {
    let sources = sources();
    let stack = sources.stack();
    let state = app(&stack);
    let w = window("2024-01-01", "2024-03-31");

    let combined = state.screening.get_records(&w).await.unwrap();
    assert_eq!(combined.len(), 3);
    assert_eq!(combined[0]["CUSTOMER_ID"], "C1");
    assert_eq!(combined[2]["customer_id"], "C1");

    for source in [Some(ScreeningSource::Oracle), Some(ScreeningSource::Sheet), None] {
        assert!(raw(&stack, &screening_key(&w, source)).await.is_some());
    }

    let onboarding = state.screening.onboarding_alerts(&w).await.unwrap();
    assert_eq!(onboarding.len(), 1);

    let merged = state.screening.merged_by_customer(&w).await.unwrap();
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0]["STATUS"], "Completed");

    assert_eq!(sources.screening_db.query_count(), 1);
    assert_eq!(sources.sheets.query_count(), 1);
}

// ============================================================================
// WARMING
// ============================================================================

#[tokio::test]
async fn test_failing_domain_does_not_block_the_others() {
    let sources = sources();
    sources.aml_db.fail_with(query_error(SourceId::AmlDb));
    let stack = sources.stack();
    let state = app(&stack);
    let w = window("2024-01-01", "2024-03-31");

    let report = state.orchestrator.warm_window(w).await;

    assert_eq!(report.failed_domains(), vec![Domain::Detections]);
    assert_eq!(report.outcome(), "partial");
    assert!(raw(&stack, &detections_key(&w, None)).await.is_none());
    assert!(raw(&stack, &aggregates_key(AggregateKind::Detections, &w)).await.is_none());

    assert!(raw(&stack, &screening_key(&w, None)).await.is_some());
    assert!(raw(&stack, &goaml_key(&w, None)).await.is_some());
    assert!(raw(&stack, &aggregates_key(AggregateKind::Screening, &w)).await.is_some());
    assert!(raw(&stack, &aggregates_key(AggregateKind::Goaml, &w)).await.is_some());
    assert!(stack.cache.last_update().is_some());
}

#[tokio::test]
async fn test_transient_failures_are_retried_up_to_the_limit() {
    let sources = sources();
    sources.aml_db.fail_with(timeout_error(SourceId::AmlDb));
    let stack = sources.stack();
    let retry = RetryConfig {
        max_retries: 2,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        backoff_multiplier: 2.0,
    };
    let state = AppState::new(stack.registry.clone(), stack.cache.clone(), stack.settings.clone(), retry);

    let report = state
        .orchestrator
        .warm_window(window("2024-01-01", "2024-03-31"))
        .await;

    let detections = &report.domains[0];
    assert_eq!(detections.domain, Domain::Detections);
    assert_eq!(detections.attempts, 3);
    assert!(!detections.loaded);
    assert_eq!(sources.aml_db.query_count(), 3);
}

#[tokio::test]
async fn test_warming_twice_writes_identical_payloads() {
    let sources = sources();
    let stack = sources.stack();
    let state = app(&stack);
    let w = window("2024-01-01", "2024-03-31");

    let keys = [
        detections_key(&w, None),
        screening_key(&w, Some(ScreeningSource::Oracle)),
        screening_key(&w, Some(ScreeningSource::Sheet)),
        screening_key(&w, None),
        goaml_key(&w, None),
        aggregates_key(AggregateKind::Detections, &w),
        aggregates_key(AggregateKind::Screening, &w),
        aggregates_key(AggregateKind::Goaml, &w),
    ];

    assert!(state.orchestrator.warm_window(w).await.is_complete());
    let mut first = Vec::new();
    for key in &keys {
        first.push(raw(&stack, key).await.expect("key written by first warm"));
    }

    assert!(state.orchestrator.warm_window(w).await.is_complete());
    for (key, before) in keys.iter().zip(first) {
        assert_eq!(raw(&stack, key).await.as_deref(), Some(before.as_str()), "{key}");
    }
}

#[tokio::test]
async fn test_warm_overwrites_existing_entries() {
    let sources = sources();
    let stack = sources.stack();
    let state = app(&stack);
    let w = window("2024-01-01", "2024-03-31");

    state.detections.get_records(&w).await.unwrap();
    sources.aml_db.set_records(detection_rows()[..1].to_vec());

    let records = state.detections.cold_load(&w).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(state.detections.get_records(&w).await.unwrap().len(), 1);
}

// ============================================================================
// DAILY UPDATE
// ============================================================================

#[tokio::test]
async fn test_daily_update_leaves_only_rewarmed_entries() {
    let sources = sources();
    let stack = sources.stack();
    let state = app(&stack);
    let current = state.orchestrator.current_window();
    let old = window("2020-01-01", "2020-03-31");

    let stale = json!(["stale"]);
    for key in [
        detections_key(&old, None),
        screening_key(&old, None),
        goaml_key(&old, Some("Draft")),
        aggregates_key(AggregateKind::Goaml, &old),
        detections_key(&current, None),
    ] {
        stack.cache.set(&key, &stale, Duration::from_secs(600)).await.unwrap();
    }

    let report = state.updater.trigger_manual_update().await;
    assert!(report.succeeded(), "{:?}", report.warm.failed_domains());
    assert!(report.eviction.removed >= 5);

    let suffix = format!(":{}:{}", current.start(), current.end());
    for domain in Domain::ALL {
        let keys = stack.cache.keys(&domain.pattern()).await.unwrap();
        assert!(!keys.is_empty(), "{domain} was not rewarmed");
        assert!(keys.iter().all(|k| k.ends_with(&suffix)), "{keys:?}");
    }

    let fresh: Vec<amlwatch_test_utils::Record> = stack
        .cache
        .get(&detections_key(&current, None))
        .await
        .unwrap();
    assert_eq!(fresh.len(), 3);
}
