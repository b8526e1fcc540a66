//! Pooled relational connector
//!
//! Wraps a deadpool-postgres pool. Connections are checked out per query
//! and go back to the pool when the checkout guard drops, which covers the
//! success, error and timeout paths alike.

use crate::connector::{ConnectorInfo, PoolStats, SourceConnector};
use crate::source::{RelationalSettings, SourceId, SourceQuery, SqlParam};
use amlwatch_core::{Record, SourceError};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts};
use futures_util::future::try_join_all;
use futures_util::{pin_mut, Stream, TryStreamExt};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{NoTls, Row};
use tracing::{debug, info, warn};

const HEALTH_QUERY: &str = "SELECT 1";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RelationalConnector {
    id: SourceId,
    name: String,
    settings: RelationalSettings,
    pool: RwLock<Option<Pool>>,
}

impl RelationalConnector {
    pub fn new(id: SourceId, name: impl Into<String>, settings: RelationalSettings) -> Self {
        Self {
            id,
            name: name.into(),
            settings,
            pool: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &RelationalSettings {
        &self.settings
    }

    fn connection_error(&self, reason: impl ToString) -> SourceError {
        SourceError::Connection {
            source_name: self.id.to_string(),
            reason: reason.to_string(),
        }
    }

    fn query_error(&self, reason: impl ToString) -> SourceError {
        SourceError::Query {
            source_name: self.id.to_string(),
            reason: reason.to_string(),
        }
    }

    fn create_pool(&self) -> Result<Pool, SourceError> {
        let mut cfg = Config::new();
        cfg.host = Some(self.settings.host.clone());
        cfg.port = Some(self.settings.port);
        cfg.dbname = Some(self.settings.dbname.clone());
        cfg.user = Some(self.settings.user.clone());
        cfg.password = Some(self.settings.password.expose_secret().to_string());
        cfg.connect_timeout = Some(self.settings.connect_timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut timeouts = Timeouts::default();
        timeouts.wait = Some(self.settings.connect_timeout);
        timeouts.create = Some(self.settings.connect_timeout);
        timeouts.recycle = Some(self.settings.connect_timeout);
        let mut pool_cfg = PoolConfig::new(self.settings.pool_max);
        pool_cfg.timeouts = timeouts;
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| self.connection_error(format!("failed to create pool: {}", e)))
    }

    async fn current_pool(&self) -> Result<Pool, SourceError> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| SourceError::NotConnected {
                source_name: self.id.to_string(),
            })
    }

    async fn run_sql(&self, pool: &Pool, text: &str, params: &[SqlParam]) -> Result<Vec<Record>, SourceError> {
        let client = pool.get().await.map_err(|e| self.connection_error(e))?;
        let stmt = client.prepare_cached(text).await.map_err(|e| self.query_error(e))?;

        let boxed = bind_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = boxed.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();

        let stream = client
            .query_raw(&stmt, refs)
            .await
            .map_err(|e| self.query_error(e))?;

        let (rows, truncated) =
            take_capped(stream.map_err(|e| self.query_error(e)), self.settings.max_rows).await?;
        if truncated {
            warn!(
                source = %self.id,
                max_rows = self.settings.max_rows,
                "Result truncated at row cap"
            );
        }
        rows.iter()
            .map(|row| row_to_record(row).map_err(|e| self.query_error(e)))
            .collect()
    }
}

#[async_trait]
impl SourceConnector for RelationalConnector {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn connect(&self) -> Result<(), SourceError> {
        let mut slot = self.pool.write().await;
        if slot.is_some() {
            return Ok(());
        }

        info!(source = %self.id, endpoint = %self.settings.endpoint(), "Connecting relational source");
        let pool = self.create_pool()?;

        // Open pool_min connections up front so bad credentials surface here.
        let warm = (0..self.settings.pool_min.min(self.settings.pool_max)).map(|_| pool.get());
        let held = try_join_all(warm).await.map_err(|e| {
            pool.close();
            self.connection_error(e)
        })?;
        drop(held);

        *slot = Some(pool);
        info!(source = %self.id, pool_min = self.settings.pool_min, pool_max = self.settings.pool_max, "Relational source connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SourceError> {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close();
            info!(source = %self.id, "Relational source disconnected");
        }
        Ok(())
    }

    async fn query(&self, query: &SourceQuery) -> Result<Vec<Record>, SourceError> {
        let SourceQuery::Sql { text, params } = query else {
            return Err(SourceError::UnsupportedQuery {
                source_name: self.id.to_string(),
                query_kind: query.kind().to_string(),
            });
        };

        let pool = self.current_pool().await?;
        let timeout = self.settings.query_timeout;
        let records = tokio::time::timeout(timeout, self.run_sql(&pool, text, params))
            .await
            .map_err(|_| SourceError::Timeout {
                source_name: self.id.to_string(),
                operation: "query".to_string(),
                timeout,
            })??;

        debug!(source = %self.id, rows = records.len(), "Relational query complete");
        Ok(records)
    }

    async fn is_healthy(&self) -> bool {
        let Ok(pool) = self.current_pool().await else {
            return false;
        };
        let probe = async {
            let client = pool.get().await.map_err(|e| e.to_string())?;
            client
                .simple_query(HEALTH_QUERY)
                .await
                .map_err(|e| e.to_string())?;
            Ok::<_, String>(())
        };
        match tokio::time::timeout(HEALTH_TIMEOUT, probe).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(source = %self.id, error = %e, "Relational health check failed");
                false
            }
            Err(_) => {
                warn!(source = %self.id, "Relational health check timed out");
                false
            }
        }
    }

    async fn describe(&self) -> ConnectorInfo {
        ConnectorInfo {
            id: self.id,
            name: self.name.clone(),
            kind: "relational",
            endpoint: self.settings.endpoint(),
            connected: self.pool.read().await.is_some(),
        }
    }

    async fn pool_stats(&self) -> Option<PoolStats> {
        let pool = self.pool.read().await.clone()?;
        let status = pool.status();
        Some(PoolStats {
            max_size: status.max_size as u64,
            size: status.size as u64,
            available: status.available as u64,
        })
    }
}

// ============================================================================
// PARAMETER AND ROW CONVERSION
// ============================================================================

fn bind_params(params: &[SqlParam]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    params
        .iter()
        .map(|p| -> Box<dyn ToSql + Sync + Send> {
            match p {
                SqlParam::Date(d) => Box::new(*d),
                SqlParam::Text(s) => Box::new(s.clone()),
                SqlParam::Int(i) => Box::new(*i),
                SqlParam::Float(f) => Box::new(*f),
                SqlParam::Bool(b) => Box::new(*b),
                SqlParam::Null => Box::new(Option::<String>::None),
            }
        })
        .collect()
}

/// Convert one row into a field map keyed by column name.
/// Read at most `max_rows` items. The flag is set when the stream had more.
async fn take_capped<S, T, E>(rows: S, max_rows: usize) -> Result<(Vec<T>, bool), E>
where
    S: Stream<Item = Result<T, E>>,
{
    pin_mut!(rows);
    let mut taken = Vec::new();
    while let Some(item) = rows.try_next().await? {
        if taken.len() >= max_rows {
            return Ok((taken, true));
        }
        taken.push(item);
    }
    Ok((taken, false))
}

fn row_to_record(row: &Row) -> Result<Record, tokio_postgres::Error> {
    let mut record = Record::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = cell_to_json(row, idx, column.type_())?;
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

fn cell_to_json(row: &Row, idx: usize, ty: &Type) -> Result<Value, tokio_postgres::Error> {
    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)?.map(Value::from)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?.map(Value::from)
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?.map(Value::from)
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?.map(Value::from)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)?.map(|f| Value::from(f as f64))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)?.map(Value::from)
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<chrono::NaiveDate>>(idx)?
            .map(|d| Value::from(d.to_string()))
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)?
            .map(|t| Value::from(t.format("%Y-%m-%dT%H:%M:%S").to_string()))
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map(|t| Value::from(t.to_rfc3339()))
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<Value>>(idx)?
    } else {
        // Text-like columns; anything without a text representation reads as null.
        row.try_get::<_, Option<String>>(idx).ok().flatten().map(Value::from)
    };
    Ok(value.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn settings() -> RelationalSettings {
        RelationalSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            dbname: "aml".to_string(),
            user: "aml".to_string(),
            password: SecretString::new("pw".into()),
            pool_min: 1,
            pool_max: 2,
            connect_timeout: Duration::from_millis(200),
            query_timeout: Duration::from_secs(1),
            max_rows: 10,
        }
    }

    #[tokio::test]
    async fn test_row_cap_truncates_one_past_limit() {
        let max_rows = settings().max_rows;
        let rows = futures_util::stream::iter((0..=max_rows).map(Ok::<_, SourceError>));
        let (taken, truncated) = take_capped(rows, max_rows).await.unwrap();
        assert_eq!(taken.len(), max_rows);
        assert!(truncated);

        let exact = futures_util::stream::iter((0..max_rows).map(Ok::<_, SourceError>));
        let (taken, truncated) = take_capped(exact, max_rows).await.unwrap();
        assert_eq!(taken.len(), max_rows);
        assert!(!truncated);
    }

    #[tokio::test]
    async fn test_row_stream_error_propagates() {
        let rows = futures_util::stream::iter(vec![
            Ok(1),
            Err(SourceError::Query {
                source_name: "aml_db".to_string(),
                reason: "bad row".to_string(),
            }),
        ]);
        assert!(matches!(
            take_capped(rows, 10).await,
            Err(SourceError::Query { .. })
        ));
    }

    #[tokio::test]
    async fn test_query_before_connect_is_not_connected() {
        let connector = RelationalConnector::new(SourceId::AmlDb, "AML database", settings());
        let err = connector
            .query(&SourceQuery::sql("SELECT 1", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotConnected { .. }));
        assert!(!connector.is_healthy().await);
        assert!(connector.pool_stats().await.is_none());
    }

    #[tokio::test]
    async fn test_rejects_non_sql_queries() {
        let connector = RelationalConnector::new(SourceId::AmlDb, "AML database", settings());
        let err = connector
            .query(&SourceQuery::Tab(crate::source::SheetTab::Goaml))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedQuery { ref query_kind, .. } if query_kind == "tab"));
    }

    #[tokio::test]
    async fn test_connect_failure_is_an_error_not_a_panic() {
        let connector = RelationalConnector::new(SourceId::ScreeningDb, "Screening database", settings());
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, SourceError::Connection { .. }));
        assert!(!connector.describe().await.connected);
        // A failed connect leaves the connector usable for a later retry.
        assert!(connector.disconnect().await.is_ok());
    }

    #[test]
    fn test_bind_params_covers_every_variant() {
        let params = vec![
            SqlParam::Date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            SqlParam::Text("x".into()),
            SqlParam::Int(1),
            SqlParam::Float(1.5),
            SqlParam::Bool(true),
            SqlParam::Null,
        ];
        assert_eq!(bind_params(&params).len(), 6);
    }

    #[cfg(feature = "live-tests")]
    #[tokio::test]
    async fn test_live_round_trip() {
        let connector = RelationalConnector::new(
            SourceId::AmlDb,
            "AML database",
            RelationalSettings::from_env("AML_DB", "aml"),
        );
        connector.connect().await.unwrap();
        assert!(connector.is_healthy().await);
        let rows = connector
            .query(&SourceQuery::sql("SELECT 1::int4 AS one, 'a'::text AS letter", vec![]))
            .await
            .unwrap();
        assert_eq!(rows[0]["one"], 1);
        assert_eq!(rows[0]["letter"], "a");
        connector.disconnect().await.unwrap();
    }
}
