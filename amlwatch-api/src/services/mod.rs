//! Cache-aside data services
//!
//! One service per domain. Every read computes its key, consults the cache
//! once and only on a miss goes to the sources through the registry. Source
//! failures propagate and are never cached; filtered views are computed in
//! memory from the domain's single cached record set.
//!
//! Each service also exposes the two steps the warming orchestrator drives
//! through [`WarmableDomain`]: an unconditional cold load that overwrites the
//! raw keys, and KPI caching from the loaded records.

pub mod detections;
pub mod goaml;
pub mod screening;

pub use detections::DetectionsService;
pub use goaml::GoamlService;
pub use screening::ScreeningService;

use crate::telemetry::metrics;
use amlwatch_connectors::{ConnectorRegistry, SourceId, SourceQuery};
use amlwatch_core::{AmlResult, CacheKey, CacheSettings, DateWindow, Domain, Record, SourceError};
use amlwatch_storage::CacheManager;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Dependencies shared by every domain service.
#[derive(Clone)]
pub struct ServiceContext {
    registry: Arc<ConnectorRegistry>,
    cache: CacheManager,
    settings: CacheSettings,
}

impl ServiceContext {
    pub fn new(registry: Arc<ConnectorRegistry>, cache: CacheManager, settings: CacheSettings) -> Self {
        Self {
            registry,
            cache,
            settings,
        }
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Cache lookup with hit/miss accounting.
    pub(crate) async fn lookup<T: DeserializeOwned>(&self, domain: Domain, key: &CacheKey) -> Option<T> {
        let cached = self.cache.get(key).await;
        let hit = cached.is_some();
        if let Some(m) = metrics() {
            m.record_cache_read(domain.prefix(), hit);
        }
        debug!(key = %key, hit, "Cache lookup");
        cached
    }

    pub(crate) async fn store_records(&self, key: &CacheKey, records: &[Record]) -> AmlResult<()> {
        self.cache.set(key, records, self.settings.default_ttl).await?;
        Ok(())
    }

    pub(crate) async fn store_aggregate<T: Serialize>(&self, key: &CacheKey, value: &T) -> AmlResult<()> {
        self.cache.set(key, value, self.settings.aggregate_ttl).await?;
        Ok(())
    }

    /// Run `query` against `source`, creating its handle on first use.
    ///
    /// A source that is not connected (it failed at startup, or was never
    /// connected) gets one connect attempt before the query is retried.
    pub(crate) async fn query_source(&self, source: SourceId, query: &SourceQuery) -> AmlResult<Vec<Record>> {
        let connector = self.registry.get_or_create(source)?;
        let started = Instant::now();
        let result = match connector.query(query).await {
            Err(SourceError::NotConnected { .. }) => {
                info!(source = %source, "Source not connected, connecting on demand");
                match connector.connect().await {
                    Ok(()) => connector.query(query).await,
                    Err(e) => Err(e),
                }
            }
            other => other,
        };
        if let Some(m) = metrics() {
            m.record_source_query(source.as_str(), result.is_ok(), started.elapsed().as_secs_f64());
        }
        let records = result?;
        debug!(source = %source, kind = query.kind(), rows = records.len(), "Source query completed");
        Ok(records)
    }
}

/// The two warming steps of one domain.
#[async_trait]
pub trait WarmableDomain: Send + Sync {
    fn domain(&self) -> Domain;

    /// Query the sources for `window` and overwrite the domain's raw keys,
    /// ignoring anything already cached. Returns the records written under
    /// the domain's primary key.
    async fn cold_load(&self, window: &DateWindow) -> AmlResult<Vec<Record>>;

    /// Compute and cache the KPI snapshot for freshly loaded records.
    async fn cache_kpis(&self, window: &DateWindow, records: &[Record]) -> AmlResult<()>;
}
