//! In-process cache store
//!
//! Used when no Redis is configured and by the test suite. Expired entries
//! are invisible to reads and purged lazily on writes and scans.

use crate::store::{CacheStore, StoreStats};
use amlwatch_core::CacheError;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    /// `None` when the TTL is past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// HashMap-backed [`CacheStore`] with per-entry expiry.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_expired(entries: &mut HashMap<String, Entry>, now: Instant) {
        entries.retain(|_, e| e.is_live(now));
    }
}

/// Translate a store glob into an anchored regex, following Redis `MATCH`:
/// `*`, `?`, `[abc]`, `[^a-z]` and `\` escapes. An unclosed `[` is rejected.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex, CacheError> {
    let invalid = |reason: &str| CacheError::DeleteFailed {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                i += 1;
                push_literal(&mut out, chars.get(i).copied().unwrap_or('\\'));
            }
            '[' => {
                i += 1;
                out.push('[');
                if chars.get(i) == Some(&'^') {
                    out.push('^');
                    i += 1;
                }
                let class_start = i;
                loop {
                    match chars.get(i) {
                        None => return Err(invalid("unclosed '[' in pattern")),
                        Some(']') if i > class_start => break,
                        Some('\\') => {
                            i += 1;
                            push_literal(&mut out, chars.get(i).copied().unwrap_or('\\'));
                        }
                        Some('-')
                            if i > class_start && chars.get(i + 1).is_some_and(|n| *n != ']') =>
                        {
                            out.push('-')
                        }
                        Some(other) => push_literal(&mut out, *other),
                    }
                    i += 1;
                }
                out.push(']');
            }
            other => push_literal(&mut out, other),
        }
        i += 1;
    }
    out.push('$');
    Regex::new(&out).map_err(|e| invalid(&e.to_string()))
}

fn push_literal(out: &mut String, ch: char) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(ch.encode_utf8(&mut buf)));
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        match entries.get(key).filter(|e| e.is_live(now)) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.value.clone()))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Self::purge_expired(&mut entries, now);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now.checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64, CacheError> {
        let mut entries = self.entries.write().await;
        Ok(u64::from(entries.remove(key).is_some()))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let matcher = glob_to_regex(pattern)?;
        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(k, e)| e.is_live(now) && matcher.is_match(k))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let matcher = glob_to_regex(pattern)?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Self::purge_expired(&mut entries, now);
        let before = entries.len();
        entries.retain(|k, _| !matcher.is_match(k));
        Ok((before - entries.len()) as u64)
    }

    async fn stats(&self) -> Result<StoreStats, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let (count, bytes) = entries
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .fold((0u64, 0usize), |(n, b), (k, e)| (n + 1, b + k.len() + e.value.len()));
        Ok(StoreStats {
            total_keys: count,
            memory_usage: human_bytes(bytes as u64),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        })
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Format a byte count the way Redis reports `used_memory_human`.
fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["K", "M", "G", "T"];
    if bytes < 1024 {
        return format!("{}B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for u in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = u;
    }
    format!("{:.2}{}", value, unit)
}
