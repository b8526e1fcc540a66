//! Cache Warming Orchestrator
//!
//! Populates the cache for the current trailing window across every domain.
//! Domains warm concurrently and fail independently: a domain whose load
//! fails is logged and reported, the others carry on, and KPI snapshots are
//! only written for domains whose raw load succeeded.
//!
//! Only one run holds the gate at a time. [`WarmingOrchestrator::warm_all`]
//! returns a skipped report when a run is already in flight;
//! [`WarmingOrchestrator::evict_and_warm`] waits for the gate so that a
//! scheduled refresh is never dropped.

use crate::services::WarmableDomain;
use crate::telemetry::metrics;
use amlwatch_core::{AmlError, CacheSettings, DateWindow, Domain, RetryConfig};
use amlwatch_storage::CacheManager;
use chrono::{DateTime, Local, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

// ============================================================================
// REPORTS
// ============================================================================

/// What happened to one domain in one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainOutcome {
    pub domain: Domain,
    /// Raw records were loaded and cached
    pub loaded: bool,
    pub record_count: Option<usize>,
    pub kpis_cached: bool,
    /// Load attempts made, including retries
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DomainOutcome {
    pub fn succeeded(&self) -> bool {
        self.loaded && self.kpis_cached
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmReport {
    pub window: DateWindow,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Another run held the gate; nothing was done
    pub skipped: bool,
    pub domains: Vec<DomainOutcome>,
}

impl WarmReport {
    fn skipped(window: DateWindow) -> Self {
        Self {
            window,
            started_at: Utc::now(),
            elapsed_ms: 0,
            skipped: true,
            domains: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.skipped && self.domains.iter().all(DomainOutcome::succeeded)
    }

    pub fn failed_domains(&self) -> Vec<Domain> {
        self.domains
            .iter()
            .filter(|d| !d.succeeded())
            .map(|d| d.domain)
            .collect()
    }

    pub fn outcome(&self) -> &'static str {
        if self.skipped {
            "skipped"
        } else if self.is_complete() {
            "complete"
        } else if self.domains.iter().any(|d| d.loaded) {
            "partial"
        } else {
            "failed"
        }
    }
}

/// Result of the eviction step of a refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictionSummary {
    pub removed: u64,
    /// Patterns whose deletion failed
    pub failed_patterns: Vec<String>,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct WarmingOrchestrator {
    domains: Vec<Arc<dyn WarmableDomain>>,
    cache: CacheManager,
    settings: CacheSettings,
    retry: RetryConfig,
    gate: Mutex<()>,
}

impl WarmingOrchestrator {
    pub fn new(
        domains: Vec<Arc<dyn WarmableDomain>>,
        cache: CacheManager,
        settings: CacheSettings,
        retry: RetryConfig,
    ) -> Self {
        Self {
            domains,
            cache,
            settings,
            retry,
            gate: Mutex::new(()),
        }
    }

    /// Trailing window ending today, process-local time.
    pub fn current_window(&self) -> DateWindow {
        DateWindow::trailing_months(Local::now().date_naive(), self.settings.window_months)
    }

    /// Whether a run currently holds the gate.
    pub fn is_running(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    /// Warm the current window. A no-op if a run is already in flight.
    pub async fn warm_all(&self) -> WarmReport {
        self.warm_window(self.current_window()).await
    }

    /// Warm an explicit window. A no-op if a run is already in flight.
    pub async fn warm_window(&self, window: DateWindow) -> WarmReport {
        match self.gate.try_lock() {
            Ok(guard) => self.run(window, guard).await,
            Err(_) => {
                info!(window = %window, "Warm run already in progress, skipping");
                if let Some(m) = metrics() {
                    m.record_warm_run("skipped", None);
                }
                WarmReport::skipped(window)
            }
        }
    }

    /// Delete every key matching `patterns`, then warm the current window.
    ///
    /// Waits for any in-flight run. Eviction finishes before the first
    /// domain starts loading.
    pub async fn evict_and_warm(&self, patterns: &[String]) -> (EvictionSummary, WarmReport) {
        let guard = self.gate.lock().await;
        let mut summary = EvictionSummary::default();
        for pattern in patterns {
            match self.cache.invalidate_pattern(pattern).await {
                Ok(removed) => summary.removed += removed,
                Err(e) => {
                    error!(pattern = %pattern, error = %e, "Failed to evict cache pattern");
                    summary.failed_patterns.push(pattern.clone());
                }
            }
        }
        info!(
            removed = summary.removed,
            failed = summary.failed_patterns.len(),
            "Evicted cache entries"
        );

        let report = self.run(self.current_window(), guard).await;
        (summary, report)
    }

    async fn run(&self, window: DateWindow, _guard: MutexGuard<'_, ()>) -> WarmReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(window = %window, domains = self.domains.len(), "Starting cache warming");

        let domains = join_all(
            self.domains
                .iter()
                .map(|domain| self.warm_domain(domain.as_ref(), &window)),
        )
        .await;

        let report = WarmReport {
            window,
            started_at,
            elapsed_ms: clock.elapsed().as_millis() as u64,
            skipped: false,
            domains,
        };

        if report.domains.iter().any(|d| d.loaded) {
            self.cache.mark_updated(Utc::now());
        }
        if let Some(m) = metrics() {
            m.record_warm_run(report.outcome(), Some(clock.elapsed().as_secs_f64()));
        }

        let failed: Vec<String> = report.failed_domains().iter().map(Domain::to_string).collect();
        if failed.is_empty() {
            info!(window = %report.window, elapsed_ms = report.elapsed_ms, "Cache warming completed");
        } else {
            warn!(
                window = %report.window,
                elapsed_ms = report.elapsed_ms,
                failed = ?failed,
                "Cache warming completed with failures"
            );
        }
        report
    }

    async fn warm_domain(&self, warmable: &dyn WarmableDomain, window: &DateWindow) -> DomainOutcome {
        let domain = warmable.domain();
        let mut attempts = 0u32;

        let loaded = loop {
            attempts += 1;
            match warmable.cold_load(window).await {
                Ok(records) => break Ok(records),
                Err(e) if e.is_transient() && attempts <= self.retry.max_retries => {
                    let delay = self.retry.backoff_for(attempts);
                    warn!(
                        domain = %domain,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Domain load failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break Err(e.in_domain(domain)),
            }
        };

        let records = match loaded {
            Ok(records) => records,
            Err(e) => return self.failed(domain, attempts, false, None, e),
        };

        let count = records.len();
        match warmable.cache_kpis(window, &records).await {
            Ok(()) => DomainOutcome {
                domain,
                loaded: true,
                record_count: Some(count),
                kpis_cached: true,
                attempts,
                error: None,
            },
            Err(e) => self.failed(domain, attempts, true, Some(count), e.in_domain(domain)),
        }
    }

    fn failed(
        &self,
        domain: Domain,
        attempts: u32,
        loaded: bool,
        record_count: Option<usize>,
        err: AmlError,
    ) -> DomainOutcome {
        error!(domain = %domain, attempts, loaded, error = %err, "Domain did not warm this cycle");
        if let Some(m) = metrics() {
            m.record_domain_failure(domain.prefix());
        }
        DomainOutcome {
            domain,
            loaded,
            record_count,
            kpis_cached: false,
            attempts,
            error: Some(err.to_string()),
        }
    }
}
