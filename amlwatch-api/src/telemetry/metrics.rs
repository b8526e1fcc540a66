//! Prometheus Metrics Definitions
//!
//! Defines all amlwatch metrics with their labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, CounterVec, Encoder,
    Histogram, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Source query latency buckets (seconds). Relational queries may run for
/// up to the query timeout.
const SOURCE_LATENCY_BUCKETS: &[f64] = &[0.010, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Warm run buckets (seconds)
const WARM_DURATION_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<AmlwatchMetrics>> = Lazy::new(AmlwatchMetrics::new);

/// The registered metrics, or `None` if registration failed.
pub fn metrics() -> Option<&'static AmlwatchMetrics> {
    METRICS.as_ref().ok()
}

#[derive(Clone)]
pub struct AmlwatchMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Cache-aside reads - labels: domain, result (hit/miss)
    pub cache_reads_total: CounterVec,

    /// Upstream queries - labels: source, status
    pub source_queries_total: CounterVec,

    /// Upstream query duration - labels: source
    pub source_query_duration_seconds: HistogramVec,

    /// Warm runs - labels: outcome (complete/partial/failed/skipped)
    pub warm_runs_total: CounterVec,

    /// Domains that did not warm in a run - labels: domain
    pub warm_domain_failures_total: CounterVec,

    /// Wall-clock time of a warm run
    pub warm_duration_seconds: Histogram,

    /// Daily refresh runs - labels: trigger (schedule/manual), outcome
    pub daily_updates_total: CounterVec,
}

impl AmlwatchMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "amlwatch_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "amlwatch_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            cache_reads_total: register_counter_vec!(
                "amlwatch_cache_reads_total",
                "Cache-aside reads by domain and result",
                &["domain", "result"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_reads_total: {}", e)))?,

            source_queries_total: register_counter_vec!(
                "amlwatch_source_queries_total",
                "Upstream source queries",
                &["source", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register source_queries_total: {}", e)))?,

            source_query_duration_seconds: register_histogram_vec!(
                "amlwatch_source_query_duration_seconds",
                "Upstream source query duration in seconds",
                &["source"],
                SOURCE_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register source_query_duration_seconds: {}", e)))?,

            warm_runs_total: register_counter_vec!(
                "amlwatch_warm_runs_total",
                "Cache warming runs by outcome",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register warm_runs_total: {}", e)))?,

            warm_domain_failures_total: register_counter_vec!(
                "amlwatch_warm_domain_failures_total",
                "Domains that failed to warm",
                &["domain"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register warm_domain_failures_total: {}", e)))?,

            warm_duration_seconds: register_histogram!(
                "amlwatch_warm_duration_seconds",
                "Cache warming run duration in seconds",
                WARM_DURATION_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register warm_duration_seconds: {}", e)))?,

            daily_updates_total: register_counter_vec!(
                "amlwatch_daily_updates_total",
                "Daily refresh runs by trigger and outcome",
                &["trigger", "outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register daily_updates_total: {}", e)))?,
        })
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_cache_read(&self, domain: &str, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_reads_total.with_label_values(&[domain, result]).inc();
    }

    pub fn record_source_query(&self, source: &str, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.source_queries_total
            .with_label_values(&[source, status])
            .inc();
        self.source_query_duration_seconds
            .with_label_values(&[source])
            .observe(duration_secs);
    }

    pub fn record_warm_run(&self, outcome: &str, duration_secs: Option<f64>) {
        self.warm_runs_total.with_label_values(&[outcome]).inc();
        if let Some(secs) = duration_secs {
            self.warm_duration_seconds.observe(secs);
        }
    }

    pub fn record_domain_failure(&self, domain: &str) {
        self.warm_domain_failures_total
            .with_label_values(&[domain])
            .inc();
    }

    pub fn record_daily_update(&self, trigger: &str, success: bool) {
        let outcome = if success { "success" } else { "error" };
        self.daily_updates_total
            .with_label_values(&[trigger, outcome])
            .inc();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    // Touch the global so every family is registered before the first scrape.
    let _ = metrics();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        let first = metrics().map(|m| m as *const AmlwatchMetrics);
        let second = metrics().map(|m| m as *const AmlwatchMetrics);
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn test_record_cache_read_labels() {
        let m = metrics().unwrap();
        let before = m.cache_reads_total.with_label_values(&["detections", "hit"]).get();
        m.record_cache_read("detections", true);
        let after = m.cache_reads_total.with_label_values(&["detections", "hit"]).get();
        assert!(after >= before + 1.0);
    }
}
