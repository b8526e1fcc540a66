//! Service Configuration
//!
//! Everything the binary reads from the environment at startup, grouped the
//! way the components consume it.

use amlwatch_connectors::SourcesConfig;
use amlwatch_core::{CacheSettings, ConfigError, RetryConfig};
use amlwatch_storage::RedisSettings;
use std::net::SocketAddr;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86_400;
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 512;

/// Which cache store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    /// Single-process store; entries vanish on restart.
    Memory,
}

impl CacheBackend {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(CacheBackend::Redis),
            "memory" => Ok(CacheBackend::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "AMLWATCH_CACHE_BACKEND".to_string(),
                value: other.to_string(),
                reason: "expected 'redis' or 'memory'".to_string(),
            }),
        }
    }
}

// ============================================================================
// SERVER CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,
    pub cors_max_age_secs: u64,
    pub max_concurrent_requests: usize,
    pub cache_backend: CacheBackend,
    /// Start a warm pass at startup (default: true)
    pub warm_on_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: Vec::new(),
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            cache_backend: CacheBackend::Redis,
            warm_on_start: true,
        }
    }
}

impl ServerConfig {
    /// Create ServerConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `AMLWATCH_HOST`: Bind address (default: 0.0.0.0)
    /// - `AMLWATCH_PORT`: Bind port (default: 3000)
    /// - `AMLWATCH_CORS_ORIGINS`: Comma-separated allowed origins (default: all)
    /// - `AMLWATCH_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `AMLWATCH_MAX_CONCURRENT_REQUESTS`: In-flight request ceiling (default: 512)
    /// - `AMLWATCH_CACHE_BACKEND`: `redis` or `memory` (default: redis)
    /// - `AMLWATCH_WARM_ON_START`: Warm at startup (default: true)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let cors_origins = std::env::var("AMLWATCH_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cache_backend = match std::env::var("AMLWATCH_CACHE_BACKEND") {
            Ok(value) => CacheBackend::parse(&value)?,
            Err(_) => defaults.cache_backend,
        };

        Ok(Self {
            host: std::env::var("AMLWATCH_HOST").unwrap_or(defaults.host),
            port: std::env::var("AMLWATCH_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins,
            cors_max_age_secs: std::env::var("AMLWATCH_CORS_MAX_AGE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cors_max_age_secs),
            max_concurrent_requests: std::env::var("AMLWATCH_MAX_CONCURRENT_REQUESTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_requests),
            cache_backend,
            warm_on_start: std::env::var("AMLWATCH_WARM_ON_START")
                .ok()
                .map(|s| s.to_lowercase() != "false")
                .unwrap_or(defaults.warm_on_start),
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                field: "AMLWATCH_HOST".to_string(),
                value: format!("{}:{}", self.host, self.port),
                reason: e.to_string(),
            })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_requests".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        self.bind_addr().map(|_| ())
    }
}

// ============================================================================
// SERVICE CONFIG
// ============================================================================

/// All startup configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub cache: CacheSettings,
    pub retry: RetryConfig,
    pub redis: RedisSettings,
    pub sources: SourcesConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            server: ServerConfig::from_env()?,
            cache: CacheSettings::from_env(),
            retry: RetryConfig::from_env(),
            redis: RedisSettings::from_env(),
            sources: SourcesConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.cache.validate()
    }
}
