//! Cache and retry configuration
//!
//! Both structs have production defaults and an env-driven constructor.
//! Unparseable environment values fall back to the default.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_WINDOW_MONTHS: u32 = 3;
pub const DEFAULT_DAILY_UPDATE_HOUR: u32 = 2;
/// 90 days.
pub const DEFAULT_TTL_SECS: u64 = 90 * 24 * 60 * 60;
/// 24 hours.
pub const DEFAULT_AGGREGATE_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 2_000;
/// Ceiling for any configured TTL: 10 years.
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

// ============================================================================
// CACHE SETTINGS
// ============================================================================

/// Window, cadence and TTL policy for the cache layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Length of the hot window in months (default: 3)
    pub window_months: u32,
    /// Local hour at which the daily update fires (default: 2)
    pub daily_update_hour: u32,
    /// TTL for raw domain records (default: 90 days)
    pub default_ttl: Duration,
    /// TTL for KPI snapshots (default: 24 hours)
    pub aggregate_ttl: Duration,
    /// Upper bound for a cache health round trip (default: 2s)
    pub health_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            window_months: DEFAULT_WINDOW_MONTHS,
            daily_update_hour: DEFAULT_DAILY_UPDATE_HOUR,
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            aggregate_ttl: Duration::from_secs(DEFAULT_AGGREGATE_TTL_SECS),
            health_timeout: Duration::from_millis(DEFAULT_HEALTH_TIMEOUT_MS),
        }
    }
}

impl CacheSettings {
    /// Create CacheSettings from environment variables.
    ///
    /// # Environment Variables
    /// - `AMLWATCH_CACHE_MONTHS`: Window length in months (default: 3)
    /// - `AMLWATCH_DAILY_UPDATE_HOUR`: Hour of the daily update, 0-23 (default: 2)
    /// - `AMLWATCH_CACHE_DEFAULT_TTL_SECS`: Raw record TTL (default: 7776000)
    /// - `AMLWATCH_CACHE_AGGREGATE_TTL_SECS`: KPI TTL (default: 86400)
    /// - `AMLWATCH_CACHE_HEALTH_TIMEOUT_MS`: Health check bound (default: 2000)
    pub fn from_env() -> Self {
        Self {
            window_months: env_parse("AMLWATCH_CACHE_MONTHS").unwrap_or(DEFAULT_WINDOW_MONTHS),
            daily_update_hour: env_parse("AMLWATCH_DAILY_UPDATE_HOUR")
                .unwrap_or(DEFAULT_DAILY_UPDATE_HOUR),
            default_ttl: Duration::from_secs(
                env_parse("AMLWATCH_CACHE_DEFAULT_TTL_SECS").unwrap_or(DEFAULT_TTL_SECS),
            ),
            aggregate_ttl: Duration::from_secs(
                env_parse("AMLWATCH_CACHE_AGGREGATE_TTL_SECS").unwrap_or(DEFAULT_AGGREGATE_TTL_SECS),
            ),
            health_timeout: Duration::from_millis(
                env_parse("AMLWATCH_CACHE_HEALTH_TIMEOUT_MS").unwrap_or(DEFAULT_HEALTH_TIMEOUT_MS),
            ),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_months == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window_months".to_string(),
                value: self.window_months.to_string(),
                reason: "window_months must be positive".to_string(),
            });
        }

        if self.daily_update_hour > 23 {
            return Err(ConfigError::InvalidValue {
                field: "daily_update_hour".to_string(),
                value: self.daily_update_hour.to_string(),
                reason: "daily_update_hour must be between 0 and 23".to_string(),
            });
        }

        if self.default_ttl.is_zero() || self.aggregate_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "ttl".to_string(),
                value: format!("{:?}/{:?}", self.default_ttl, self.aggregate_ttl),
                reason: "TTLs must be positive".to_string(),
            });
        }

        if self.default_ttl > Duration::from_secs(MAX_TTL_SECS) {
            return Err(ConfigError::InvalidValue {
                field: "default_ttl".to_string(),
                value: self.default_ttl.as_secs().to_string(),
                reason: format!("TTLs must not exceed {} seconds", MAX_TTL_SECS),
            });
        }

        if self.aggregate_ttl > self.default_ttl {
            return Err(ConfigError::InvalidValue {
                field: "aggregate_ttl".to_string(),
                value: format!("{:?}", self.aggregate_ttl),
                reason: "aggregate_ttl must not exceed default_ttl".to_string(),
            });
        }

        Ok(())
    }
}

// ============================================================================
// RETRY
// ============================================================================

/// Exponential backoff policy for per-domain warming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 2)
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Create RetryConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `AMLWATCH_WARM_MAX_RETRIES` (default: 2)
    /// - `AMLWATCH_WARM_INITIAL_BACKOFF_MS` (default: 500)
    /// - `AMLWATCH_WARM_MAX_BACKOFF_MS` (default: 10000)
    pub fn from_env() -> Self {
        Self {
            max_retries: env_parse("AMLWATCH_WARM_MAX_RETRIES").unwrap_or(DEFAULT_MAX_RETRIES),
            initial_backoff: Duration::from_millis(
                env_parse("AMLWATCH_WARM_INITIAL_BACKOFF_MS").unwrap_or(DEFAULT_INITIAL_BACKOFF_MS),
            ),
            max_backoff: Duration::from_millis(
                env_parse("AMLWATCH_WARM_MAX_BACKOFF_MS").unwrap_or(DEFAULT_MAX_BACKOFF_MS),
            ),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Delay before retry number `attempt` (1-based), capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exp);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_settings_defaults() {
        let settings = CacheSettings::default();
        assert_eq!(settings.window_months, 3);
        assert_eq!(settings.daily_update_hour, 2);
        assert_eq!(settings.default_ttl, Duration::from_secs(7_776_000));
        assert_eq!(settings.aggregate_ttl, Duration::from_secs(86_400));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_hour() {
        let settings = CacheSettings {
            daily_update_hour: 24,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "daily_update_hour"
        ));
    }

    #[test]
    fn test_validate_rejects_aggregate_ttl_above_default() {
        let settings = CacheSettings {
            aggregate_ttl: Duration::from_secs(DEFAULT_TTL_SECS + 1),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_ttl_above_ceiling() {
        let settings = CacheSettings {
            default_ttl: Duration::from_secs(u64::MAX),
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "default_ttl"
        ));

        let at_ceiling = CacheSettings {
            default_ttl: Duration::from_secs(MAX_TTL_SECS),
            ..Default::default()
        };
        assert!(at_ceiling.validate().is_ok());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let retry = RetryConfig {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            backoff_multiplier: 2.0,
        };
        assert_eq!(retry.backoff_for(1), Duration::from_millis(100));
        assert_eq!(retry.backoff_for(2), Duration::from_millis(200));
        assert_eq!(retry.backoff_for(3), Duration::from_millis(350));
        assert_eq!(retry.backoff_for(10), Duration::from_millis(350));
    }
}
