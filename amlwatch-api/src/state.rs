//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use amlwatch_connectors::ConnectorRegistry;
use amlwatch_core::{CacheSettings, ConfigError, RetryConfig};
use amlwatch_storage::{CacheManager, CacheStore, InMemoryCacheStore, RedisCacheStore, RedisSettings};

use crate::config::CacheBackend;
use crate::jobs::DailyUpdater;
use crate::services::{DetectionsService, GoamlService, ScreeningService, ServiceContext, WarmableDomain};
use crate::warming::WarmingOrchestrator;

/// Everything a handler can reach. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectorRegistry>,
    pub cache: CacheManager,
    pub detections: DetectionsService,
    pub screening: ScreeningService,
    pub goaml: GoamlService,
    pub orchestrator: Arc<WarmingOrchestrator>,
    pub updater: Arc<DailyUpdater>,
    pub settings: CacheSettings,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the services, orchestrator and updater around one registry and
    /// one cache.
    pub fn new(
        registry: Arc<ConnectorRegistry>,
        cache: CacheManager,
        settings: CacheSettings,
        retry: RetryConfig,
    ) -> Self {
        let ctx = ServiceContext::new(Arc::clone(&registry), cache.clone(), settings.clone());
        let detections = DetectionsService::new(ctx.clone());
        let screening = ScreeningService::new(ctx.clone());
        let goaml = GoamlService::new(ctx);

        let domains: Vec<Arc<dyn WarmableDomain>> = vec![
            Arc::new(detections.clone()),
            Arc::new(screening.clone()),
            Arc::new(goaml.clone()),
        ];
        let orchestrator = Arc::new(WarmingOrchestrator::new(
            domains,
            cache.clone(),
            settings.clone(),
            retry,
        ));
        let updater = Arc::new(DailyUpdater::new(
            Arc::clone(&orchestrator),
            cache.clone(),
            settings.clone(),
        ));

        Self {
            registry,
            cache,
            detections,
            screening,
            goaml,
            orchestrator,
            updater,
            settings,
            start_time: Instant::now(),
        }
    }
}

/// Cache store for the configured backend. Redis connects lazily.
pub fn cache_store(backend: CacheBackend, redis: &RedisSettings) -> Result<Arc<dyn CacheStore>, ConfigError> {
    match backend {
        CacheBackend::Redis => Ok(Arc::new(RedisCacheStore::new(redis.clone())?)),
        CacheBackend::Memory => Ok(Arc::new(InMemoryCacheStore::new())),
    }
}
