//! amlwatch Test Utilities
//!
//! Shared test infrastructure for the workspace:
//! - Call-counting stub connectors with swappable data and failures
//! - A stub connector factory for the registry
//! - Record and window fixtures
//! - An in-memory stack (registry + cache) for service-level tests

pub use amlwatch_core::{
    CacheKey, CacheSettings, DateWindow, Domain, Record, RetryConfig, SourceError,
};
pub use amlwatch_connectors::{SheetTab, SourceId, SourceQuery};

use amlwatch_connectors::{ConnectorFactory, ConnectorInfo, ConnectorRegistry, SourceConnector};
use amlwatch_core::ConfigError;
use amlwatch_storage::{CacheManager, InMemoryCacheStore};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A record from a JSON object literal.
///
/// # Panics
/// If `value` is not an object.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("record fixture must be a JSON object, got {other}"),
    }
}

pub fn records(values: impl IntoIterator<Item = Value>) -> Vec<Record> {
    values.into_iter().map(record).collect()
}

/// Window from `YYYY-MM-DD` bounds.
///
/// # Panics
/// If the bounds do not parse or are inverted.
pub fn window(start: &str, end: &str) -> DateWindow {
    match DateWindow::parse(start, end) {
        Ok(window) => window,
        Err(e) => panic!("invalid fixture window {start}..{end}: {e}"),
    }
}

pub fn connection_error(source: SourceId) -> SourceError {
    SourceError::Connection {
        source_name: source.to_string(),
        reason: "stub connection refused".to_string(),
    }
}

pub fn query_error(source: SourceId) -> SourceError {
    SourceError::Query {
        source_name: source.to_string(),
        reason: "stub query rejected".to_string(),
    }
}

pub fn timeout_error(source: SourceId) -> SourceError {
    SourceError::Timeout {
        source_name: source.to_string(),
        operation: "query".to_string(),
        timeout: Duration::from_millis(1),
    }
}

// ============================================================================
// STUB CONNECTOR
// ============================================================================

/// In-memory connector that counts every call.
///
/// `Tab` queries answer from the per-tab rows when set, otherwise from the
/// default rows. A configured failure applies to `connect` and `query`
/// until cleared.
pub struct StubConnector {
    id: SourceId,
    rows: Mutex<Vec<Record>>,
    tabs: Mutex<HashMap<SheetTab, Vec<Record>>>,
    failure: Mutex<Option<SourceError>>,
    connected: AtomicBool,
    queries: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl StubConnector {
    pub fn new(id: SourceId) -> Self {
        Self {
            id,
            rows: Mutex::new(Vec::new()),
            tabs: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
            connected: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    pub fn with_records(self, rows: Vec<Record>) -> Self {
        self.set_records(rows);
        self
    }

    pub fn with_tab(self, tab: SheetTab, rows: Vec<Record>) -> Self {
        lock(&self.tabs).insert(tab, rows);
        self
    }

    pub fn failing(self, err: SourceError) -> Self {
        self.fail_with(err);
        self
    }

    /// Replace the default rows, e.g. to simulate upstream changes.
    pub fn set_records(&self, rows: Vec<Record>) {
        *lock(&self.rows) = rows;
    }

    pub fn fail_with(&self, err: SourceError) {
        *lock(&self.failure) = Some(err);
    }

    pub fn recover(&self) {
        *lock(&self.failure) = None;
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn failure(&self) -> Option<SourceError> {
        lock(&self.failure).clone()
    }
}

#[async_trait]
impl SourceConnector for StubConnector {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn connect(&self) -> Result<(), SourceError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure() {
            return Err(err);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SourceError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn query(&self, query: &SourceQuery) -> Result<Vec<Record>, SourceError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure() {
            return Err(err);
        }
        if let SourceQuery::Tab(tab) = query {
            if let Some(rows) = lock(&self.tabs).get(tab) {
                return Ok(rows.clone());
            }
        }
        Ok(lock(&self.rows).clone())
    }

    async fn is_healthy(&self) -> bool {
        self.failure().is_none()
    }

    async fn describe(&self) -> ConnectorInfo {
        ConnectorInfo {
            id: self.id,
            name: format!("stub {}", self.id),
            kind: "stub",
            endpoint: "memory".to_string(),
            connected: self.connected.load(Ordering::SeqCst),
        }
    }
}

// ============================================================================
// STUB FACTORY
// ============================================================================

/// Hands out pre-built connectors. Unknown sources are configuration
/// failures.
#[derive(Default)]
pub struct StubFactory {
    connectors: HashMap<SourceId, Arc<dyn SourceConnector>>,
    created: AtomicUsize,
}

impl StubFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, connector: Arc<StubConnector>) -> Self {
        self.connectors.insert(connector.id(), connector);
        self
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ConnectorFactory for StubFactory {
    fn create(&self, id: SourceId) -> Result<Arc<dyn SourceConnector>, ConfigError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.connectors
            .get(&id)
            .cloned()
            .ok_or_else(|| ConfigError::MissingRequired {
                field: format!("{} settings", id),
            })
    }
}

// ============================================================================
// IN-MEMORY STACK
// ============================================================================

/// Registry and cache wired the way the binary wires them, minus I/O.
pub struct TestStack {
    pub registry: Arc<ConnectorRegistry>,
    pub store: Arc<InMemoryCacheStore>,
    pub cache: CacheManager,
    pub settings: CacheSettings,
}

pub fn memory_stack(factory: StubFactory) -> TestStack {
    let store = Arc::new(InMemoryCacheStore::new());
    let settings = CacheSettings::default();
    let cache = CacheManager::new(store.clone(), settings.health_timeout);
    TestStack {
        registry: Arc::new(ConnectorRegistry::new(Arc::new(factory))),
        store,
        cache,
        settings,
    }
}

/// Stubs for all three sources, empty by default.
pub struct StubSources {
    pub aml_db: Arc<StubConnector>,
    pub screening_db: Arc<StubConnector>,
    pub sheets: Arc<StubConnector>,
}

impl StubSources {
    pub fn new(aml_db: StubConnector, screening_db: StubConnector, sheets: StubConnector) -> Self {
        Self {
            aml_db: Arc::new(aml_db),
            screening_db: Arc::new(screening_db),
            sheets: Arc::new(sheets),
        }
    }

    pub fn empty() -> Self {
        Self::new(
            StubConnector::new(SourceId::AmlDb),
            StubConnector::new(SourceId::ScreeningDb),
            StubConnector::new(SourceId::Sheets),
        )
    }

    pub fn factory(&self) -> StubFactory {
        StubFactory::new()
            .with(Arc::clone(&self.aml_db))
            .with(Arc::clone(&self.screening_db))
            .with(Arc::clone(&self.sheets))
    }

    pub fn stack(&self) -> TestStack {
        memory_stack(self.factory())
    }
}
