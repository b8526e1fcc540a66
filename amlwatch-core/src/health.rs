//! Health check types shared by the cache store, connectors and HTTP layer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health status for a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Serving, but at least one dependency is down
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Overall status from a set of component checks. The cache is the only
    /// hard dependency; a down source only degrades.
    pub fn rollup(cache_ok: bool, sources: impl IntoIterator<Item = bool>) -> Self {
        if !cache_ok {
            return HealthStatus::Unhealthy;
        }
        if sources.into_iter().all(|ok| ok) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        }
    }
}

/// Result of checking one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl HealthCheck {
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            component: component.into(),
            message: None,
            response_time_ms: None,
            metadata: None,
        }
    }

    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            component: component.into(),
            message: Some(message.into()),
            response_time_ms: None,
            metadata: None,
        }
    }

    /// Healthy or unhealthy depending on `ok`.
    pub fn from_probe(component: impl Into<String>, ok: bool) -> Self {
        if ok {
            Self::healthy(component)
        } else {
            Self::unhealthy(component, "probe failed")
        }
    }

    pub fn with_response_time(mut self, ms: i64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollup() {
        assert_eq!(HealthStatus::rollup(true, [true, true]), HealthStatus::Healthy);
        assert_eq!(HealthStatus::rollup(true, [true, false]), HealthStatus::Degraded);
        assert_eq!(HealthStatus::rollup(false, [true]), HealthStatus::Unhealthy);
        assert_eq!(HealthStatus::rollup(true, []), HealthStatus::Healthy);
    }

    #[test]
    fn test_probe_and_metadata() {
        let check = HealthCheck::from_probe("redis", false)
            .with_response_time(12)
            .with_metadata("keys", serde_json::json!(4));
        assert!(!check.is_healthy());
        assert_eq!(check.response_time_ms, Some(12));
        assert_eq!(check.metadata.unwrap()["keys"], 4);
    }
}
