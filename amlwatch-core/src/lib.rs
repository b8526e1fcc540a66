//! amlwatch Core - Domain Types
//!
//! Pure data structures and functions shared by every other crate: the
//! sliding date window, the cache key scheme, record helpers, KPI
//! computation and the error taxonomy. Nothing in here performs I/O.

pub mod config;
pub mod error;
pub mod health;
pub mod keys;
pub mod kpi;
pub mod record;
pub mod window;

pub use config::{CacheSettings, RetryConfig};
pub use error::{AmlError, AmlResult, CacheError, ConfigError, SourceError, ValidationError};
pub use health::{HealthCheck, HealthStatus};
pub use keys::{AggregateKind, CacheKey, Domain, ScreeningSource};
pub use kpi::{DetectionKpis, GoamlKpis, ScreeningKpis};
pub use record::Record;
pub use window::DateWindow;
