//! Logical sources and their settings
//!
//! A [`LogicalSource`] names one upstream origin and carries everything a
//! connector needs to reach it. It is immutable once built.

use chrono::NaiveDate;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// SOURCE IDENTITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// Transaction-monitoring database (detections)
    AmlDb,
    /// Screening database
    ScreeningDb,
    /// Spreadsheet workbook holding screening and goAML tabs
    Sheets,
}

impl SourceId {
    pub const ALL: [SourceId; 3] = [SourceId::AmlDb, SourceId::ScreeningDb, SourceId::Sheets];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::AmlDb => "aml_db",
            SourceId::ScreeningDb => "screening_db",
            SourceId::Sheets => "sheets",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct LogicalSource {
    pub id: SourceId,
    pub name: String,
    pub kind: SourceKind,
}

#[derive(Debug, Clone)]
pub enum SourceKind {
    Relational(RelationalSettings),
    Spreadsheet(SpreadsheetSettings),
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Relational(_) => "relational",
            SourceKind::Spreadsheet(_) => "spreadsheet",
        }
    }
}

// ============================================================================
// RELATIONAL SETTINGS
// ============================================================================

pub const DEFAULT_POOL_MIN: usize = 2;
pub const DEFAULT_POOL_MAX: usize = 10;
pub const DEFAULT_MAX_ROWS: usize = 100_000;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct RelationalSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: SecretString,
    /// Connections opened eagerly by `connect` (default: 2)
    pub pool_min: usize,
    /// Pool ceiling (default: 10)
    pub pool_max: usize,
    pub connect_timeout: Duration,
    /// Bound on one whole query including row streaming (default: 60s)
    pub query_timeout: Duration,
    /// Rows beyond this are discarded (default: 100000)
    pub max_rows: usize,
}

impl RelationalSettings {
    /// Read settings for one database from `AMLWATCH_{PREFIX}_*`.
    ///
    /// # Environment Variables
    /// - `_HOST` (default: localhost), `_PORT` (default: 5432)
    /// - `_NAME`, `_USER`, `_PASSWORD`
    /// - `_POOL_MIN` (default: 2), `_POOL_MAX` (default: 10)
    /// - `_CONNECT_TIMEOUT_SECS` (default: 10), `_QUERY_TIMEOUT_SECS` (default: 60)
    /// - `_MAX_ROWS` (default: 100000)
    pub fn from_env(prefix: &str, default_db: &str) -> Self {
        let var = |suffix: &str| std::env::var(format!("AMLWATCH_{}_{}", prefix, suffix)).ok();
        let parsed = |suffix: &str| var(suffix).and_then(|s| s.parse::<u64>().ok());

        let pool_min = parsed("POOL_MIN").map(|n| n as usize).unwrap_or(DEFAULT_POOL_MIN);
        let pool_max = parsed("POOL_MAX")
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_POOL_MAX)
            .max(pool_min.max(1));

        Self {
            host: var("HOST").unwrap_or_else(|| "localhost".to_string()),
            port: var("PORT").and_then(|s| s.parse().ok()).unwrap_or(5432),
            dbname: var("NAME").unwrap_or_else(|| default_db.to_string()),
            user: var("USER").unwrap_or_else(|| default_db.to_string()),
            password: SecretString::new(var("PASSWORD").unwrap_or_default().into()),
            pool_min,
            pool_max,
            connect_timeout: Duration::from_secs(
                parsed("CONNECT_TIMEOUT_SECS").unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
            query_timeout: Duration::from_secs(
                parsed("QUERY_TIMEOUT_SECS").unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS),
            ),
            max_rows: parsed("MAX_ROWS").map(|n| n as usize).unwrap_or(DEFAULT_MAX_ROWS),
        }
    }

    /// `host:port/dbname`, no credentials.
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.dbname)
    }
}

// ============================================================================
// SPREADSHEET SETTINGS
// ============================================================================

pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";
pub const DEFAULT_SHEETS_CONFIG_PATH: &str = "config/googlesheets.json";
pub const DEFAULT_SHEETS_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct SpreadsheetSettings {
    /// JSON file with service-account credentials and named tabs
    pub config_path: PathBuf,
    pub api_base: String,
    pub request_timeout: Duration,
}

impl SpreadsheetSettings {
    /// # Environment Variables
    /// - `AMLWATCH_SHEETS_CONFIG` (default: config/googlesheets.json)
    /// - `AMLWATCH_SHEETS_API_BASE` (default: https://sheets.googleapis.com/v4)
    /// - `AMLWATCH_SHEETS_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Self {
        Self {
            config_path: PathBuf::from(
                std::env::var("AMLWATCH_SHEETS_CONFIG")
                    .unwrap_or_else(|_| DEFAULT_SHEETS_CONFIG_PATH.to_string()),
            ),
            api_base: std::env::var("AMLWATCH_SHEETS_API_BASE")
                .unwrap_or_else(|_| DEFAULT_SHEETS_API_BASE.to_string()),
            request_timeout: Duration::from_secs(
                std::env::var("AMLWATCH_SHEETS_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SHEETS_TIMEOUT_SECS),
            ),
        }
    }
}

// ============================================================================
// SOURCES CONFIG
// ============================================================================

/// Definitions for every known source.
#[derive(Debug, Clone)]
pub struct SourcesConfig {
    pub aml_db: RelationalSettings,
    pub screening_db: RelationalSettings,
    pub sheets: SpreadsheetSettings,
}

impl SourcesConfig {
    pub fn from_env() -> Self {
        Self {
            aml_db: RelationalSettings::from_env("AML_DB", "aml"),
            screening_db: RelationalSettings::from_env("SCREENING_DB", "screening"),
            sheets: SpreadsheetSettings::from_env(),
        }
    }

    pub fn source(&self, id: SourceId) -> LogicalSource {
        let (name, kind) = match id {
            SourceId::AmlDb => ("AML database", SourceKind::Relational(self.aml_db.clone())),
            SourceId::ScreeningDb => (
                "Screening database",
                SourceKind::Relational(self.screening_db.clone()),
            ),
            SourceId::Sheets => ("Spreadsheets", SourceKind::Spreadsheet(self.sheets.clone())),
        };
        LogicalSource {
            id,
            name: name.to_string(),
            kind,
        }
    }
}

// ============================================================================
// QUERIES
// ============================================================================

/// Named tabs in the spreadsheet configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetTab {
    Screening,
    Goaml,
}

impl SheetTab {
    pub fn as_str(&self) -> &'static str {
        match self {
            SheetTab::Screening => "screening",
            SheetTab::Goaml => "goaml",
        }
    }
}

/// Positional SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Date(NaiveDate),
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

/// A source-agnostic query. Each connector accepts the variants that make
/// sense for its transport and rejects the rest.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceQuery {
    Sql { text: String, params: Vec<SqlParam> },
    /// A1 range on a sheet; `None` reads the default range.
    Range { sheet_id: String, range: Option<String> },
    /// A tab named in the spreadsheet configuration.
    Tab(SheetTab),
}

impl SourceQuery {
    pub fn sql(text: impl Into<String>, params: Vec<SqlParam>) -> Self {
        SourceQuery::Sql {
            text: text.into(),
            params,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SourceQuery::Sql { .. } => "sql",
            SourceQuery::Range { .. } => "range",
            SourceQuery::Tab(_) => "tab",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_ids_are_stable() {
        let ids: Vec<&str> = SourceId::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(ids, vec!["aml_db", "screening_db", "sheets"]);
        assert_eq!(serde_json::to_value(SourceId::ScreeningDb).unwrap(), "screening_db");
    }

    #[test]
    fn test_relational_defaults() {
        let settings = RelationalSettings::from_env("AMLWATCH_TEST_UNSET", "aml");
        assert_eq!(settings.pool_min, 2);
        assert_eq!(settings.pool_max, 10);
        assert_eq!(settings.max_rows, 100_000);
        assert_eq!(settings.endpoint(), "localhost:5432/aml");
    }

    #[test]
    fn test_sources_config_kinds() {
        let config = SourcesConfig::from_env();
        assert_eq!(config.source(SourceId::AmlDb).kind.label(), "relational");
        assert_eq!(config.source(SourceId::Sheets).kind.label(), "spreadsheet");
    }
}
