//! Screening records
//!
//! Screening has two sources, the screening database and the screening tab
//! of the spreadsheet. Each is cached under its own key and the combined
//! view (relational rows first, then sheet rows) under the unfiltered key.

use super::{ServiceContext, WarmableDomain};
use amlwatch_connectors::{SheetTab, SourceId, SourceQuery, SqlParam};
use amlwatch_core::keys::{aggregates_key, screening_key};
use amlwatch_core::kpi::{daily_trend, DatedCount};
use amlwatch_core::record::{field_eq, field_str, filter_by_window};
use amlwatch_core::{
    AggregateKind, AmlResult, DateWindow, Domain, Record, ScreeningKpis, ScreeningSource,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

const SCREENING_SQL: &str = "\
SELECT id, customer_id, screening_date, status, hit_type, investigator, resolution_date
FROM screening_records
WHERE screening_date::date >= $1 AND screening_date::date <= $2
ORDER BY screening_date DESC";

/// Date columns checked on sheet rows, in order.
pub const SHEET_DATE_FIELDS: &[&str] = &["screening_date", "date"];
pub const DATE_FIELDS: &[&str] = &["SCREENING_DATE"];

#[derive(Clone)]
pub struct ScreeningService {
    ctx: ServiceContext,
}

impl ScreeningService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    async fn load_relational(&self, window: &DateWindow) -> AmlResult<Vec<Record>> {
        let query = SourceQuery::sql(
            SCREENING_SQL,
            vec![SqlParam::Date(window.start()), SqlParam::Date(window.end())],
        );
        self.ctx.query_source(SourceId::ScreeningDb, &query).await
    }

    async fn load_sheet(&self, window: &DateWindow) -> AmlResult<Vec<Record>> {
        let rows = self
            .ctx
            .query_source(SourceId::Sheets, &SourceQuery::Tab(SheetTab::Screening))
            .await?;
        Ok(filter_by_window(rows, window, SHEET_DATE_FIELDS))
    }

    async fn cached_or_load(
        &self,
        window: &DateWindow,
        source: ScreeningSource,
    ) -> AmlResult<Vec<Record>> {
        let key = screening_key(window, Some(source));
        if let Some(records) = self.ctx.lookup(Domain::Screening, &key).await {
            return Ok(records);
        }

        let loaded = match source {
            ScreeningSource::Oracle => self.load_relational(window).await,
            ScreeningSource::Sheet => self.load_sheet(window).await,
        };
        let records = loaded.map_err(|e| e.in_domain(Domain::Screening))?;
        self.ctx.store_records(&key, &records).await?;
        Ok(records)
    }

    /// Screening rows from the screening database.
    pub async fn relational_records(&self, window: &DateWindow) -> AmlResult<Vec<Record>> {
        self.cached_or_load(window, ScreeningSource::Oracle).await
    }

    /// Screening rows from the spreadsheet whose date falls in `window`.
    pub async fn sheet_records(&self, window: &DateWindow) -> AmlResult<Vec<Record>> {
        self.cached_or_load(window, ScreeningSource::Sheet).await
    }

    /// Both sources concatenated, cache first.
    pub async fn get_records(&self, window: &DateWindow) -> AmlResult<Vec<Record>> {
        let key = screening_key(window, None);
        if let Some(records) = self.ctx.lookup(Domain::Screening, &key).await {
            return Ok(records);
        }

        let (relational, sheet) =
            futures_util::try_join!(self.relational_records(window), self.sheet_records(window))?;
        let combined = concat(relational, sheet);
        self.ctx.store_records(&key, &combined).await?;
        Ok(combined)
    }

    /// Rows flagged as onboarding alerts.
    pub async fn onboarding_alerts(&self, window: &DateWindow) -> AmlResult<Vec<Record>> {
        let records = self.get_records(window).await?;
        Ok(records
            .into_iter()
            .filter(|r| field_eq(r, "STATUS", "Alert") || field_eq(r, "HIT_TYPE", "Onboarding"))
            .collect())
    }

    /// One record per customer id across both sources.
    pub async fn merged_by_customer(&self, window: &DateWindow) -> AmlResult<Vec<Record>> {
        let (relational, sheet) =
            futures_util::try_join!(self.relational_records(window), self.sheet_records(window))?;
        Ok(merge_by_customer(relational, sheet))
    }

    pub async fn kpis(&self, window: &DateWindow) -> AmlResult<ScreeningKpis> {
        let key = aggregates_key(AggregateKind::Screening, window);
        if let Some(kpis) = self.ctx.lookup(Domain::Aggregates, &key).await {
            return Ok(kpis);
        }

        let records = self.get_records(window).await?;
        let kpis = ScreeningKpis::compute(&records);
        self.ctx.store_aggregate(&key, &kpis).await?;
        Ok(kpis)
    }

    pub async fn trends(&self, window: &DateWindow) -> AmlResult<Vec<DatedCount>> {
        let records = self.get_records(window).await?;
        Ok(daily_trend(&records, DATE_FIELDS))
    }
}

fn concat(mut relational: Vec<Record>, sheet: Vec<Record>) -> Vec<Record> {
    relational.extend(sheet);
    relational
}

/// Merge rows sharing a customer id. Sheet fields overwrite relational
/// fields for the same customer; rows without an id are dropped.
pub fn merge_by_customer(relational: Vec<Record>, sheet: Vec<Record>) -> Vec<Record> {
    let mut merged: BTreeMap<String, Record> = BTreeMap::new();

    for mut record in relational {
        if let Some(id) = field_str(&record, "CUSTOMER_ID") {
            record.insert("source".to_string(), json!("oracle"));
            merged.insert(id, record);
        }
    }

    for mut record in sheet {
        let Some(id) = field_str(&record, "customer_id") else {
            continue;
        };
        match merged.get_mut(&id) {
            Some(existing) => {
                existing.extend(record);
                existing.insert("sources".to_string(), json!(["oracle", "sheet"]));
            }
            None => {
                record.insert("source".to_string(), Value::from("sheet"));
                merged.insert(id, record);
            }
        }
    }

    merged.into_values().collect()
}

#[async_trait]
impl WarmableDomain for ScreeningService {
    fn domain(&self) -> Domain {
        Domain::Screening
    }

    async fn cold_load(&self, window: &DateWindow) -> AmlResult<Vec<Record>> {
        let relational = self.load_relational(window).await?;
        self.ctx
            .store_records(&screening_key(window, Some(ScreeningSource::Oracle)), &relational)
            .await?;
        info!(window = %window, count = relational.len(), "Cached relational screening records");

        let sheet = self.load_sheet(window).await?;
        self.ctx
            .store_records(&screening_key(window, Some(ScreeningSource::Sheet)), &sheet)
            .await?;
        info!(window = %window, count = sheet.len(), "Cached sheet screening records");

        let combined = concat(relational, sheet);
        self.ctx
            .store_records(&screening_key(window, None), &combined)
            .await?;
        Ok(combined)
    }

    async fn cache_kpis(&self, window: &DateWindow, records: &[Record]) -> AmlResult<()> {
        let kpis = ScreeningKpis::compute(records);
        self.ctx
            .store_aggregate(&aggregates_key(AggregateKind::Screening, window), &kpis)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_merge_sheet_overwrites_relational() {
        let relational = vec![
            record(json!({"CUSTOMER_ID": "C1", "STATUS": "Pending"})),
            record(json!({"CUSTOMER_ID": "C2", "STATUS": "Completed"})),
            record(json!({"STATUS": "Orphan"})),
        ];
        let sheet = vec![
            record(json!({"customer_id": "C1", "STATUS": "Completed", "note": "cleared"})),
            record(json!({"customer_id": "C3", "status": "Pending"})),
        ];

        let merged = merge_by_customer(relational, sheet);
        assert_eq!(merged.len(), 3);

        let c1 = &merged[0];
        assert_eq!(c1["STATUS"], "Completed");
        assert_eq!(c1["note"], "cleared");
        assert_eq!(c1["sources"], json!(["oracle", "sheet"]));

        assert_eq!(merged[1]["source"], "oracle");
        assert_eq!(merged[2]["source"], "sheet");
    }

    #[test]
    fn test_merge_of_empty_sources_is_empty() {
        assert!(merge_by_customer(vec![], vec![]).is_empty());
    }
}
