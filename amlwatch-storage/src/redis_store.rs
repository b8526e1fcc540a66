//! Redis-backed cache store
//!
//! Connects lazily through a [`ConnectionManager`], which reconnects on its
//! own after a dropped connection. Pattern deletes walk the keyspace with
//! `SCAN MATCH` and remove each page with a single multi-key `DEL`; `KEYS`
//! is never issued. Every command is bounded by `op_timeout`.

use crate::store::{CacheStore, StoreStats};
use amlwatch_core::config::MAX_TTL_SECS;
use amlwatch_core::{CacheError, ConfigError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_OP_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_SCAN_COUNT: usize = 500;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    pub url: String,
    /// Bound for any single command (default: 2s)
    pub op_timeout: Duration,
    /// `COUNT` hint per `SCAN` page and `DEL` batch size (default: 500)
    pub scan_count: usize,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            op_timeout: Duration::from_millis(DEFAULT_OP_TIMEOUT_MS),
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }
}

impl RedisSettings {
    /// Create RedisSettings from environment variables.
    ///
    /// # Environment Variables
    /// - `AMLWATCH_REDIS_URL`: Full URL. Takes precedence over host/port/password.
    /// - `AMLWATCH_REDIS_HOST` (default: 127.0.0.1), `AMLWATCH_REDIS_PORT` (default: 6379)
    /// - `AMLWATCH_REDIS_PASSWORD`: Optional
    /// - `AMLWATCH_REDIS_TIMEOUT_MS`: Per-command timeout (default: 2000)
    /// - `AMLWATCH_REDIS_SCAN_COUNT`: SCAN page size (default: 500)
    pub fn from_env() -> Self {
        let url = std::env::var("AMLWATCH_REDIS_URL").ok().unwrap_or_else(|| {
            let host = std::env::var("AMLWATCH_REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
            let port: u16 = std::env::var("AMLWATCH_REDIS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(6379);
            match std::env::var("AMLWATCH_REDIS_PASSWORD").ok().filter(|p| !p.is_empty()) {
                Some(password) => format!("redis://:{}@{}:{}", password, host, port),
                None => format!("redis://{}:{}", host, port),
            }
        });

        Self {
            url,
            op_timeout: Duration::from_millis(
                std::env::var("AMLWATCH_REDIS_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_OP_TIMEOUT_MS),
            ),
            scan_count: std::env::var("AMLWATCH_REDIS_SCAN_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(DEFAULT_SCAN_COUNT),
        }
    }

    /// URL with any password masked, for logs.
    pub fn redacted_url(&self) -> String {
        match (self.url.find("://"), self.url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                format!("{}***{}", &self.url[..scheme_end + 3], &self.url[at..])
            }
            _ => self.url.clone(),
        }
    }
}

// ============================================================================
// STORE
// ============================================================================

pub struct RedisCacheStore {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    settings: RedisSettings,
    /// Logical database selected by the URL.
    db: i64,
}

impl RedisCacheStore {
    /// Validate the URL. No connection is made until the first command.
    pub fn new(settings: RedisSettings) -> Result<Self, ConfigError> {
        let client = redis::Client::open(settings.url.as_str()).map_err(|e| ConfigError::InvalidValue {
            field: "redis_url".to_string(),
            value: settings.redacted_url(),
            reason: e.to_string(),
        })?;
        let db = client.get_connection_info().redis.db;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            settings,
            db,
        })
    }

    pub fn settings(&self) -> &RedisSettings {
        &self.settings
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let manager = self.bounded(ConnectionManager::new(self.client.clone())).await?;
                info!(url = %self.settings.redacted_url(), "Connected to Redis");
                Ok::<_, CacheError>(manager)
            })
            .await?;
        Ok(conn.clone())
    }

    /// Run a Redis future under the per-command timeout.
    async fn bounded<T, F>(&self, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.settings.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CacheError::Unavailable {
                reason: e.to_string(),
            }),
            Err(_) => Err(CacheError::Unavailable {
                reason: format!("redis command timed out after {:?}", self.settings.op_timeout),
            }),
        }
    }

    /// Walk all keys matching `pattern`, one SCAN page at a time.
    async fn scan_pages(&self, pattern: &str) -> Result<Vec<Vec<String>>, CacheError> {
        let mut conn = self.connection().await?;
        let mut cursor: u64 = 0;
        let mut pages = Vec::new();
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(self.settings.scan_count);
            let (next, keys): (u64, Vec<String>) = self.bounded(cmd.query_async(&mut conn)).await?;
            if !keys.is_empty() {
                pages.push(keys);
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(pages)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = self.bounded(conn.get(key)).await?;
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await.map_err(|e| CacheError::WriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let millis = ttl_millis(ttl);
        let result: Result<(), CacheError> = self.bounded(conn.pset_ex(key, value, millis)).await;
        result.map_err(|e| CacheError::WriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    async fn delete(&self, key: &str) -> Result<u64, CacheError> {
        let mut conn = self.connection().await?;
        let removed: u64 = self.bounded(conn.del(key)).await?;
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut keys: Vec<String> = self.scan_pages(pattern).await?.into_iter().flatten().collect();
        // SCAN may return a key more than once across pages.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let pages = self.scan_pages(pattern).await.map_err(|e| CacheError::DeleteFailed {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let mut conn = self.connection().await?;
        let mut removed = 0u64;
        for page in pages {
            let count: u64 = self
                .bounded(conn.del(&page))
                .await
                .map_err(|e| CacheError::DeleteFailed {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                })?;
            removed += count;
        }
        debug!(pattern, removed, "Deleted keys by pattern");
        Ok(removed)
    }

    async fn stats(&self) -> Result<StoreStats, CacheError> {
        let mut conn = self.connection().await?;
        let info: String = self.bounded(redis::cmd("INFO").query_async(&mut conn)).await?;
        Ok(parse_info(&info, self.db))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _pong: String = self.bounded(redis::cmd("PING").query_async(&mut conn)).await?;
        Ok(())
    }
}

/// `PSETEX` argument for a TTL, clamped to `[1ms, MAX_TTL_SECS]`.
fn ttl_millis(ttl: Duration) -> u64 {
    let capped = ttl.min(Duration::from_secs(MAX_TTL_SECS));
    u64::try_from(capped.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Pull key count, memory and hit counters out of an `INFO` reply. Only
/// the keyspace line of database `db` is counted.
fn parse_info(info: &str, db: i64) -> StoreStats {
    let keyspace = format!("db{}", db);
    let mut stats = StoreStats::default();
    for line in info.lines() {
        let Some((name, value)) = line.trim().split_once(':') else {
            continue;
        };
        match name {
            "used_memory_human" => stats.memory_usage = value.to_string(),
            "keyspace_hits" => stats.hits = value.parse().unwrap_or(0),
            "keyspace_misses" => stats.misses = value.parse().unwrap_or(0),
            name if name == keyspace => {
                // db0:keys=12,expires=12,avg_ttl=0
                let keys = value
                    .split(',')
                    .find_map(|kv| kv.strip_prefix("keys="))
                    .and_then(|n| n.parse::<u64>().ok())
                    .unwrap_or(0);
                stats.total_keys = keys;
            }
            _ => {}
        }
    }
    stats
}
