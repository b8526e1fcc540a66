//! Connector registry
//!
//! Holds at most one live connector per [`SourceId`]. Handles are created
//! lazily through a [`ConnectorFactory`], so tests swap in stubs without
//! touching the registry itself. A source whose configuration is unusable is
//! remembered as failed and reports unhealthy; other sources are unaffected.

use crate::connector::{ConnectorInfo, PoolStats, SourceConnector};
use crate::relational::RelationalConnector;
use crate::sheets::SpreadsheetConnector;
use crate::source::{SourceId, SourceKind, SourcesConfig};
use amlwatch_core::{AmlError, ConfigError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Builds a connector for one source.
pub trait ConnectorFactory: Send + Sync {
    fn create(&self, id: SourceId) -> Result<Arc<dyn SourceConnector>, ConfigError>;
}

/// Production factory backed by environment configuration.
pub struct SourceConfigFactory {
    config: SourcesConfig,
}

impl SourceConfigFactory {
    pub fn new(config: SourcesConfig) -> Self {
        Self { config }
    }
}

impl ConnectorFactory for SourceConfigFactory {
    fn create(&self, id: SourceId) -> Result<Arc<dyn SourceConnector>, ConfigError> {
        let source = self.config.source(id);
        match source.kind {
            SourceKind::Relational(settings) => {
                Ok(Arc::new(RelationalConnector::new(id, source.name, settings)))
            }
            SourceKind::Spreadsheet(settings) => Ok(Arc::new(SpreadsheetConnector::from_settings(
                id,
                source.name,
                settings,
            )?)),
        }
    }
}

/// Outcome of a bulk lifecycle call, one entry per source attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleReport {
    pub succeeded: Vec<SourceId>,
    pub failed: BTreeMap<SourceId, String>,
}

impl LifecycleReport {
    pub fn all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ConnectorRegistry {
    factory: Arc<dyn ConnectorFactory>,
    handles: DashMap<SourceId, Arc<dyn SourceConnector>>,
    config_failures: DashMap<SourceId, String>,
}

impl ConnectorRegistry {
    pub fn new(factory: Arc<dyn ConnectorFactory>) -> Self {
        Self {
            factory,
            handles: DashMap::new(),
            config_failures: DashMap::new(),
        }
    }

    /// Return the handle for `id`, creating it on first use.
    ///
    /// Concurrent callers for the same id all receive the same handle.
    pub fn get_or_create(&self, id: SourceId) -> Result<Arc<dyn SourceConnector>, AmlError> {
        match self.handles.entry(id) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => match self.factory.create(id) {
                Ok(connector) => {
                    self.config_failures.remove(&id);
                    info!(source = %id, "Connector created");
                    Ok(Arc::clone(entry.insert(connector).value()))
                }
                Err(e) => {
                    error!(source = %id, error = %e, "Connector configuration unusable");
                    self.config_failures.insert(id, e.to_string());
                    Err(e.into())
                }
            },
        }
    }

    /// Handle for `id` if one was already created.
    pub fn existing(&self, id: SourceId) -> Option<Arc<dyn SourceConnector>> {
        self.handles.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Connect every known source. Failures are independent.
    pub async fn connect_all(&self) -> LifecycleReport {
        let attempts = SourceId::ALL.iter().map(|&id| async move {
            let outcome = match self.get_or_create(id) {
                Ok(connector) => connector.connect().await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            (id, outcome)
        });

        let mut report = LifecycleReport::default();
        for (id, outcome) in join_all(attempts).await {
            match outcome {
                Ok(()) => {
                    info!(source = %id, "Source connected");
                    report.succeeded.push(id);
                }
                Err(reason) => {
                    warn!(source = %id, error = %reason, "Source failed to connect");
                    report.failed.insert(id, reason);
                }
            }
        }
        report
    }

    /// Disconnect every live handle. Handles stay registered, so a later
    /// `connect` reopens the same connector.
    pub async fn disconnect_all(&self) -> LifecycleReport {
        let live: Vec<(SourceId, Arc<dyn SourceConnector>)> = self
            .handles
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let attempts = live.into_iter().map(|(id, connector)| async move {
            (id, connector.disconnect().await.map_err(|e| e.to_string()))
        });

        let mut report = LifecycleReport::default();
        for (id, outcome) in join_all(attempts).await {
            match outcome {
                Ok(()) => report.succeeded.push(id),
                Err(reason) => {
                    warn!(source = %id, error = %reason, "Source failed to disconnect");
                    report.failed.insert(id, reason);
                }
            }
        }
        report.succeeded.sort();
        report
    }

    /// Health of every instantiated or failed source.
    ///
    /// Sources never instantiated are omitted.
    pub async fn health_all(&self) -> BTreeMap<SourceId, bool> {
        let live = self.snapshot();
        let probes = live
            .into_iter()
            .map(|(id, connector)| async move { (id, connector.is_healthy().await) });

        let mut health: BTreeMap<SourceId, bool> = join_all(probes).await.into_iter().collect();
        for failure in self.config_failures.iter() {
            health.entry(*failure.key()).or_insert(false);
        }
        health
    }

    pub async fn describe_all(&self) -> Vec<ConnectorInfo> {
        let live = self.snapshot();
        join_all(live.iter().map(|(_, connector)| connector.describe())).await
    }

    pub async fn pool_stats_all(&self) -> BTreeMap<SourceId, PoolStats> {
        let live = self.snapshot();
        let stats = live
            .into_iter()
            .map(|(id, connector)| async move { (id, connector.pool_stats().await) });
        join_all(stats)
            .await
            .into_iter()
            .filter_map(|(id, stats)| stats.map(|s| (id, s)))
            .collect()
    }

    /// Sources whose configuration could not be turned into a connector.
    pub fn config_failures(&self) -> BTreeMap<SourceId, String> {
        self.config_failures
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    fn snapshot(&self) -> Vec<(SourceId, Arc<dyn SourceConnector>)> {
        let mut live: Vec<_> = self
            .handles
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        live.sort_by_key(|(id, _)| *id);
        live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceQuery;
    use amlwatch_core::{Record, SourceError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        id: SourceId,
        fail_connect: bool,
    }

    #[async_trait]
    impl SourceConnector for FakeSource {
        fn id(&self) -> SourceId {
            self.id
        }
        async fn connect(&self) -> Result<(), SourceError> {
            if self.fail_connect {
                Err(SourceError::Connection {
                    source_name: self.id.to_string(),
                    reason: "refused".to_string(),
                })
            } else {
                Ok(())
            }
        }
        async fn disconnect(&self) -> Result<(), SourceError> {
            Ok(())
        }
        async fn query(&self, _query: &SourceQuery) -> Result<Vec<Record>, SourceError> {
            Ok(vec![])
        }
        async fn is_healthy(&self) -> bool {
            !self.fail_connect
        }
        async fn describe(&self) -> ConnectorInfo {
            ConnectorInfo {
                id: self.id,
                name: self.id.to_string(),
                kind: "fake",
                endpoint: "memory".to_string(),
                connected: !self.fail_connect,
            }
        }
    }

    struct FakeFactory {
        created: AtomicUsize,
        failing_connect: Option<SourceId>,
        bad_config: Option<SourceId>,
    }

    impl FakeFactory {
        fn new(failing_connect: Option<SourceId>, bad_config: Option<SourceId>) -> Self {
            Self {
                created: AtomicUsize::new(0),
                failing_connect,
                bad_config,
            }
        }
    }

    impl ConnectorFactory for FakeFactory {
        fn create(&self, id: SourceId) -> Result<Arc<dyn SourceConnector>, ConfigError> {
            if self.bad_config == Some(id) {
                return Err(ConfigError::MissingRequired {
                    field: "credentials".to_string(),
                });
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FakeSource {
                id,
                fail_connect: self.failing_connect == Some(id),
            }))
        }
    }

    #[test]
    fn test_get_or_create_returns_same_handle() {
        let factory = Arc::new(FakeFactory::new(None, None));
        let registry = ConnectorRegistry::new(factory.clone());
        let a = registry.get_or_create(SourceId::AmlDb).unwrap();
        let b = registry.get_or_create(SourceId::AmlDb).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_all_failures_are_independent() {
        let factory = Arc::new(FakeFactory::new(
            Some(SourceId::ScreeningDb),
            Some(SourceId::Sheets),
        ));
        let registry = ConnectorRegistry::new(factory);
        let report = registry.connect_all().await;

        assert_eq!(report.succeeded, vec![SourceId::AmlDb]);
        assert!(report.failed.contains_key(&SourceId::ScreeningDb));
        assert!(report.failed.contains_key(&SourceId::Sheets));

        let health = registry.health_all().await;
        assert_eq!(health.get(&SourceId::AmlDb), Some(&true));
        assert_eq!(health.get(&SourceId::ScreeningDb), Some(&false));
        assert_eq!(health.get(&SourceId::Sheets), Some(&false));
    }

    #[tokio::test]
    async fn test_health_omits_uninstantiated_sources() {
        let registry = ConnectorRegistry::new(Arc::new(FakeFactory::new(None, None)));
        registry.get_or_create(SourceId::AmlDb).unwrap();
        let health = registry.health_all().await;
        assert_eq!(health.len(), 1);
        assert_eq!(health.get(&SourceId::AmlDb), Some(&true));
    }

    #[tokio::test]
    async fn test_disconnect_all_keeps_one_handle_per_source() {
        let factory = Arc::new(FakeFactory::new(None, None));
        let registry = ConnectorRegistry::new(factory.clone());
        registry.connect_all().await;
        let before = registry.get_or_create(SourceId::AmlDb).unwrap();

        let report = registry.disconnect_all().await;
        assert_eq!(report.succeeded.len(), 3);
        assert!(registry.existing(SourceId::AmlDb).is_some());

        let reconnected = registry.connect_all().await;
        assert!(reconnected.all_ok());
        let after = registry.get_or_create(SourceId::AmlDb).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(factory.created.load(Ordering::SeqCst), 3);
    }
}
