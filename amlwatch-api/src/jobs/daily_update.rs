//! Daily Cache Refresh
//!
//! Once a day, at a configured local hour, every domain prefix is flushed
//! and the current window is rewarmed. Operators can trigger the same
//! routine by hand; both paths go through [`DailyUpdater::run_daily_update`].
//!
//! A run never takes the scheduler down with it: eviction and warming
//! failures are reported, and a panicking run is caught at the task
//! boundary so the next tick still fires.

use crate::telemetry::metrics;
use crate::warming::{EvictionSummary, WarmReport, WarmingOrchestrator};
use amlwatch_core::window::retention_cutoff;
use amlwatch_core::{CacheSettings, Domain};
use amlwatch_storage::{CacheManager, CacheStats};
use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

// ============================================================================
// SCHEDULE
// ============================================================================

/// Time from `now` until the next `hour:00` strictly after it.
///
/// Always in `(0, 24h]`; an hour outside 0-23 falls back to a full day.
pub fn next_run_delay(now: NaiveDateTime, hour: u32) -> Duration {
    let Some(today_at) = now.date().and_hms_opt(hour, 0, 0) else {
        return Duration::from_secs(SECS_PER_DAY);
    };
    let next = if today_at > now {
        today_at
    } else {
        today_at + TimeDelta::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::from_secs(SECS_PER_DAY))
}

// ============================================================================
// UPDATE ROUTINE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateTrigger {
    Scheduled,
    Manual,
}

impl UpdateTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateTrigger::Scheduled => "scheduled",
            UpdateTrigger::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUpdateReport {
    pub trigger: UpdateTrigger,
    pub yesterday: NaiveDate,
    pub retention_cutoff: NaiveDate,
    pub eviction: EvictionSummary,
    pub warm: WarmReport,
    /// Absent when the store could not report stats
    pub stats: Option<CacheStats>,
}

impl DailyUpdateReport {
    pub fn succeeded(&self) -> bool {
        self.eviction.failed_patterns.is_empty() && self.warm.is_complete()
    }
}

pub struct DailyUpdater {
    orchestrator: Arc<WarmingOrchestrator>,
    cache: CacheManager,
    settings: CacheSettings,
}

impl DailyUpdater {
    pub fn new(orchestrator: Arc<WarmingOrchestrator>, cache: CacheManager, settings: CacheSettings) -> Self {
        Self {
            orchestrator,
            cache,
            settings,
        }
    }

    pub fn update_hour(&self) -> u32 {
        self.settings.daily_update_hour
    }

    /// Flush every domain prefix, rewarm the current window, log stats.
    pub async fn run_daily_update(&self, trigger: UpdateTrigger) -> DailyUpdateReport {
        let today = Local::now().date_naive();
        let yesterday = today.pred_opt().unwrap_or(today);
        let cutoff = retention_cutoff(today, self.settings.window_months);
        info!(
            trigger = trigger.as_str(),
            %yesterday,
            retention_cutoff = %cutoff,
            "Starting daily cache update"
        );

        let patterns: Vec<String> = Domain::ALL.iter().map(Domain::pattern).collect();
        let (eviction, warm) = self.orchestrator.evict_and_warm(&patterns).await;

        let stats = match self.cache.stats().await {
            Ok(stats) => {
                info!(
                    total_keys = stats.total_keys,
                    memory_usage = %stats.memory_usage,
                    hit_rate = ?stats.hit_rate,
                    "Cache stats after daily update"
                );
                Some(stats)
            }
            Err(e) => {
                warn!(error = %e, "Could not read cache stats after daily update");
                None
            }
        };

        let report = DailyUpdateReport {
            trigger,
            yesterday,
            retention_cutoff: cutoff,
            eviction,
            warm,
            stats,
        };

        if let Some(m) = metrics() {
            m.record_daily_update(trigger.as_str(), report.succeeded());
        }
        if report.succeeded() {
            info!(trigger = trigger.as_str(), "Daily cache update completed");
        } else {
            error!(
                trigger = trigger.as_str(),
                failed_patterns = ?report.eviction.failed_patterns,
                failed_domains = ?report.warm.failed_domains(),
                "Daily cache update finished with errors"
            );
        }
        report
    }

    /// Operator entry point; same routine as the scheduled run.
    pub async fn trigger_manual_update(&self) -> DailyUpdateReport {
        self.run_daily_update(UpdateTrigger::Manual).await
    }
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Run the daily update at the configured hour until shutdown.
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(daily_update_task(updater.clone(), shutdown_rx));
///
/// // On shutdown
/// let _ = shutdown_tx.send(true);
/// handle.await?;
/// ```
pub async fn daily_update_task(updater: Arc<DailyUpdater>, mut shutdown_rx: watch::Receiver<bool>) {
    let hour = updater.update_hour();
    info!(hour, "Daily update task started");

    loop {
        let delay = next_run_delay(Local::now().naive_local(), hour);
        info!(next_run_in_secs = delay.as_secs(), "Next daily update scheduled");

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Daily update task shutting down");
                    break;
                }
            }

            _ = tokio::time::sleep(delay) => {
                let run = Arc::clone(&updater);
                let handle = tokio::spawn(async move {
                    run.run_daily_update(UpdateTrigger::Scheduled).await
                });
                if let Err(e) = handle.await {
                    error!(error = %e, "Daily update run aborted");
                    if let Some(m) = metrics() {
                        m.record_daily_update(UpdateTrigger::Scheduled.as_str(), false);
                    }
                }
            }
        }
    }
}
