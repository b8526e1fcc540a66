//! amlwatch Storage - Cache Store
//!
//! The cache is the only persisted state the service owns. Entries are
//! namespaced by domain prefix and expire by TTL unless invalidated.
//!
//! - [`CacheStore`]: untyped key/value/TTL backend trait
//! - [`RedisCacheStore`]: production backend
//! - [`InMemoryCacheStore`]: single-process backend for local runs and tests
//! - [`CacheManager`]: typed facade with best-effort reads

pub mod manager;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use manager::{hit_rate, CacheManager, CacheStats};
pub use memory::InMemoryCacheStore;
pub use redis_store::{RedisCacheStore, RedisSettings};
pub use store::{CacheStore, StoreStats};
