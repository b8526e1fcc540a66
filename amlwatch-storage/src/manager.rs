//! Typed cache facade
//!
//! Wraps a [`CacheStore`] with JSON (de)serialization and the failure policy
//! the services rely on: reads are best-effort and collapse every failure to
//! a miss, writes and deletes report their errors.

use crate::store::CacheStore;
use amlwatch_core::{CacheError, CacheKey};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Snapshot reported to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_keys: u64,
    pub memory_usage: String,
    /// `hits / (hits + misses) * 100`, absent before any traffic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_rate: Option<f64>,
    /// Completion time of the most recent successful warm.
    pub last_update: Option<DateTime<Utc>>,
}

/// Percentage of lookups that hit, or `None` with no lookups yet.
pub fn hit_rate(hits: u64, misses: u64) -> Option<f64> {
    let total = hits + misses;
    if total == 0 {
        None
    } else {
        Some(hits as f64 / total as f64 * 100.0)
    }
}

#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    health_timeout: Duration,
    last_update: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>, health_timeout: Duration) -> Self {
        Self {
            store,
            health_timeout,
            last_update: Arc::new(RwLock::new(None)),
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Cached value for `key`. Missing, malformed and unreachable all read
    /// as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let raw = match self.store.get_raw(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached payload is malformed, treating as miss");
                None
            }
        }
    }

    /// Serialize and store `value`, replacing any existing entry.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let size = raw.len();
        self.store.set_raw(key.as_str(), raw, ttl).await?;
        debug!(key = %key, bytes = size, ttl_secs = ttl.as_secs(), "Cached payload");
        Ok(())
    }

    pub async fn invalidate(&self, key: &CacheKey) -> Result<u64, CacheError> {
        self.store.delete(key.as_str()).await
    }

    /// Delete every key matching a glob such as `detections:*`.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let removed = self.store.delete_pattern(pattern).await?;
        debug!(pattern, removed, "Invalidated cache pattern");
        Ok(removed)
    }

    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.store.keys(pattern).await
    }

    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let raw = self.store.stats().await?;
        Ok(CacheStats {
            total_keys: raw.total_keys,
            memory_usage: raw.memory_usage,
            hit_rate: hit_rate(raw.hits, raw.misses),
            last_update: self.last_update(),
        })
    }

    /// Ping with a bounded wait. Never errors.
    pub async fn is_healthy(&self) -> bool {
        match tokio::time::timeout(self.health_timeout, self.store.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Cache health check failed");
                false
            }
            Err(_) => {
                warn!(timeout = ?self.health_timeout, "Cache health check timed out");
                false
            }
        }
    }

    /// Record that a warming pass finished.
    pub fn mark_updated(&self, at: DateTime<Utc>) {
        match self.last_update.write() {
            Ok(mut guard) => *guard = Some(at),
            Err(poisoned) => *poisoned.into_inner() = Some(at),
        }
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        match self.last_update.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryCacheStore;
    use crate::store::StoreStats;
    use amlwatch_core::keys::goaml_key;
    use amlwatch_core::DateWindow;
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        fn backend_name(&self) -> &'static str {
            "broken"
        }
        async fn get_raw(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable { reason: "down".into() })
        }
        async fn set_raw(&self, key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::WriteFailed { key: key.into(), reason: "down".into() })
        }
        async fn delete(&self, _key: &str) -> Result<u64, CacheError> {
            Err(CacheError::Unavailable { reason: "down".into() })
        }
        async fn keys(&self, _pattern: &str) -> Result<Vec<String>, CacheError> {
            Err(CacheError::Unavailable { reason: "down".into() })
        }
        async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
            Err(CacheError::DeleteFailed { pattern: pattern.into(), reason: "down".into() })
        }
        async fn stats(&self) -> Result<StoreStats, CacheError> {
            Err(CacheError::Unavailable { reason: "down".into() })
        }
        async fn ping(&self) -> Result<(), CacheError> {
            Err(CacheError::Unavailable { reason: "down".into() })
        }
    }

    struct HangingStore;

    #[async_trait]
    impl CacheStore for HangingStore {
        fn backend_name(&self) -> &'static str {
            "hanging"
        }
        async fn get_raw(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Ok(None)
        }
        async fn set_raw(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Ok(())
        }
        async fn delete(&self, _key: &str) -> Result<u64, CacheError> {
            Ok(0)
        }
        async fn keys(&self, _pattern: &str) -> Result<Vec<String>, CacheError> {
            Ok(Vec::new())
        }
        async fn delete_pattern(&self, _pattern: &str) -> Result<u64, CacheError> {
            Ok(0)
        }
        async fn stats(&self) -> Result<StoreStats, CacheError> {
            Ok(StoreStats::default())
        }
        async fn ping(&self) -> Result<(), CacheError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    fn key() -> CacheKey {
        goaml_key(&DateWindow::parse("2024-01-01", "2024-03-31").unwrap(), None)
    }

    fn memory_manager() -> CacheManager {
        CacheManager::new(Arc::new(InMemoryCacheStore::new()), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let cache = memory_manager();
        cache
            .set(&key(), &vec![1u32, 2, 3], Duration::from_secs(60))
            .await
            .unwrap();
        let value: Option<Vec<u32>> = cache.get(&key()).await;
        assert_eq!(value, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_malformed_payload_reads_as_miss() {
        let cache = memory_manager();
        cache
            .store()
            .set_raw(key().as_str(), "{not json".into(), Duration::from_secs(60))
            .await
            .unwrap();
        let value: Option<Vec<u32>> = cache.get(&key()).await;
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_read_failure_degrades_but_write_failure_propagates() {
        let cache = CacheManager::new(Arc::new(BrokenStore), Duration::from_millis(200));
        let value: Option<Vec<u32>> = cache.get(&key()).await;
        assert!(value.is_none());

        let err = cache
            .set(&key(), &vec![1u32], Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::WriteFailed { .. }));
        assert!(cache.invalidate_pattern("goaml:*").await.is_err());
        assert!(!cache.is_healthy().await);
    }

    #[tokio::test]
    async fn test_health_check_is_bounded() {
        let cache = CacheManager::new(Arc::new(HangingStore), Duration::from_millis(50));
        let started = std::time::Instant::now();
        assert!(!cache.is_healthy().await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stats_hit_rate_absent_without_traffic() {
        let cache = memory_manager();
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hit_rate, None);
        assert_eq!(stats.last_update, None);

        cache.set(&key(), &1u8, Duration::from_secs(60)).await.unwrap();
        let _: Option<u8> = cache.get(&key()).await;
        let _: Option<u8> = cache.get(&goaml_key(&DateWindow::parse("2023-01-01", "2023-01-02").unwrap(), None)).await;

        let now = Utc::now();
        cache.mark_updated(now);
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_keys, 1);
        assert_eq!(stats.hit_rate, Some(50.0));
        assert_eq!(stats.last_update, Some(now));
    }

    #[test]
    fn test_hit_rate() {
        assert_eq!(hit_rate(0, 0), None);
        assert_eq!(hit_rate(3, 1), Some(75.0));
    }
}
