//! amlwatch Telemetry - Observability Infrastructure
//!
//! Structured logging through `tracing` and Prometheus metrics for the
//! warming pipeline, the cache read path and the HTTP layer.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics, metrics_handler, AmlwatchMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracing, LogFormat, TelemetryConfig};
