//! amlwatch API - Cache Orchestration Service
//!
//! Serves AML dashboard data out of a cache that is warmed for the trailing
//! window and refreshed once a day. The pieces:
//!
//! - [`services`]: cache-aside reads per domain (detections, screening, goAML)
//! - [`warming`]: the single-flight warming orchestrator
//! - [`jobs`]: the daily evict-and-rewarm scheduler
//! - [`routes`]: the Axum HTTP facade
//!
//! Connectors and the cache store live in `amlwatch-connectors` and
//! `amlwatch-storage`; both are injected through [`AppState::new`].

pub mod config;
pub mod error;
pub mod jobs;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod warming;

// Re-export commonly used types
pub use config::{CacheBackend, ServerConfig, ServiceConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{daily_update_task, DailyUpdateReport, DailyUpdater, UpdateTrigger};
pub use response::{ApiResponse, ResponseMetadata};
pub use routes::create_router;
pub use services::{DetectionsService, GoamlService, ScreeningService, ServiceContext, WarmableDomain};
pub use state::{cache_store, AppState};
pub use warming::{DomainOutcome, EvictionSummary, WarmReport, WarmingOrchestrator};
