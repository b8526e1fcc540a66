//! amlwatch Connectors - Upstream Data Sources
//!
//! Every upstream origin sits behind [`SourceConnector`]. The
//! [`ConnectorRegistry`] owns one handle per [`SourceId`] and drives bulk
//! connect, disconnect and health checks with independent failures.

pub mod connector;
pub mod registry;
pub mod relational;
pub mod sheets;
pub mod source;

pub use connector::{ConnectorInfo, PoolStats, SourceConnector};
pub use registry::{ConnectorFactory, ConnectorRegistry, LifecycleReport, SourceConfigFactory};
pub use relational::RelationalConnector;
pub use sheets::{SheetMetadata, SheetsFileConfig, SpreadsheetConnector};
pub use source::{
    LogicalSource, RelationalSettings, SheetTab, SourceId, SourceKind, SourceQuery, SourcesConfig,
    SpreadsheetSettings, SqlParam,
};
