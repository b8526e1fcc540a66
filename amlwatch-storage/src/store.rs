//! Cache store trait
//!
//! A `CacheStore` is an untyped string key/value store with per-entry TTL.
//! Serialization and the best-effort read policy live one level up in
//! [`CacheManager`](crate::CacheManager); stores report every failure.

use amlwatch_core::CacheError;
use async_trait::async_trait;
use std::time::Duration;

/// Raw counters reported by a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Live keys in the store's namespace.
    pub total_keys: u64,
    /// Human-readable memory figure as the store reports it (e.g. `1.04M`).
    pub memory_usage: String,
    /// Lookups that found a key.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
}

/// Key-value store with TTL, shared by every service.
///
/// Implementations must be safe for concurrent use without external locking.
/// Writes to the same key are last-write-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short name used in logs and health output.
    fn backend_name(&self) -> &'static str;

    /// Raw payload for `key`, or `None` if absent or expired.
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write `value` under `key`, replacing any existing entry.
    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Remove one key. Returns the number of keys removed.
    async fn delete(&self, key: &str) -> Result<u64, CacheError>;

    /// Keys matching a Redis-style glob (`*`, `?`, `[...]`, `\` escapes).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    /// Remove every key matching `pattern` in batches. Returns the number removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError>;

    async fn stats(&self) -> Result<StoreStats, CacheError>;

    /// Lightweight round trip.
    async fn ping(&self) -> Result<(), CacheError>;
}
