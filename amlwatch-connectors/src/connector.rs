//! Source connector contract

use crate::source::{SourceId, SourceQuery};
use amlwatch_core::{Record, SourceError};
use async_trait::async_trait;
use serde::Serialize;

/// What a connector reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorInfo {
    pub id: SourceId,
    pub name: String,
    pub kind: &'static str,
    /// Endpoint or account, never credentials.
    pub endpoint: String,
    pub connected: bool,
}

/// Pool occupancy for relational sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub max_size: u64,
    pub size: u64,
    pub available: u64,
}

/// Uniform access to one upstream source.
///
/// A connector owns its transport (pool, HTTP client, token) privately.
/// Construction is cheap; `connect` does the expensive work and may be
/// retried after a failure.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    fn id(&self) -> SourceId;

    async fn connect(&self) -> Result<(), SourceError>;

    /// Release resources. Idempotent.
    async fn disconnect(&self) -> Result<(), SourceError>;

    /// Run `query` and return rows in source order. An empty result is `Ok(vec![])`.
    async fn query(&self, query: &SourceQuery) -> Result<Vec<Record>, SourceError>;

    /// Trivial round trip. Never errors.
    async fn is_healthy(&self) -> bool;

    async fn describe(&self) -> ConnectorInfo;

    async fn pool_stats(&self) -> Option<PoolStats> {
        None
    }
}
