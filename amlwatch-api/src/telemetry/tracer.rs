//! Tracing Subscriber Initialization

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

const DEFAULT_FILTER: &str = "amlwatch_api=debug,tower_http=info,info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event (default)
    Json,
    /// Human-readable lines for local runs
    Pretty,
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: std::env::var("AMLWATCH_SERVICE_NAME")
                .unwrap_or_else(|_| "amlwatch-api".to_string()),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: std::env::var("AMLWATCH_ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            log_format: match std::env::var("AMLWATCH_LOG_FORMAT") {
                Ok(value) if value.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
                _ => LogFormat::Json,
            },
        }
    }
}

/// Install the global subscriber. Call once, before anything logs.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).try_init(),
    };
    result.map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = %config.service_name,
        service_version = %config.service_version,
        environment = %config.environment,
        log_format = ?config.log_format,
        "Telemetry initialized"
    );

    Ok(())
}
