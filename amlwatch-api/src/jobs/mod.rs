//! Background Jobs
//!
//! - `daily_update`: flushes every domain prefix and rewarms the current
//!   window once a day at the configured local hour
//!
//! # Usage
//!
//! ```ignore
//! use amlwatch_api::jobs::daily_update_task;
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(daily_update_task(Arc::clone(&updater), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod daily_update;

pub use daily_update::{
    daily_update_task, next_run_delay, DailyUpdateReport, DailyUpdater, UpdateTrigger,
};
