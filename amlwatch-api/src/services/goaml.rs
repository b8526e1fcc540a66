//! goAML regulatory reports, read from the goaml tab of the spreadsheet.

use super::{ServiceContext, WarmableDomain};
use amlwatch_connectors::{SheetTab, SourceId, SourceQuery};
use amlwatch_core::keys::{aggregates_key, goaml_key};
use amlwatch_core::kpi::{daily_trend, distribution, DatedCount, LabelCount};
use amlwatch_core::record::{field_eq, filter_by_window};
use amlwatch_core::{AggregateKind, AmlResult, DateWindow, Domain, GoamlKpis, Record};
use async_trait::async_trait;
use tracing::info;

pub const DATE_FIELDS: &[&str] = &["report_date", "date"];

#[derive(Clone)]
pub struct GoamlService {
    ctx: ServiceContext,
}

impl GoamlService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    async fn load(&self, window: &DateWindow) -> AmlResult<Vec<Record>> {
        let rows = self
            .ctx
            .query_source(SourceId::Sheets, &SourceQuery::Tab(SheetTab::Goaml))
            .await?;
        Ok(filter_by_window(rows, window, DATE_FIELDS))
    }

    /// Reports dated inside `window`, cache first.
    pub async fn get_records(&self, window: &DateWindow) -> AmlResult<Vec<Record>> {
        let key = goaml_key(window, None);
        if let Some(records) = self.ctx.lookup(Domain::Goaml, &key).await {
            return Ok(records);
        }

        let records = self
            .load(window)
            .await
            .map_err(|e| e.in_domain(Domain::Goaml))?;
        self.ctx.store_records(&key, &records).await?;
        Ok(records)
    }

    pub async fn by_status(&self, status: &str, window: &DateWindow) -> AmlResult<Vec<Record>> {
        let records = self.get_records(window).await?;
        Ok(records
            .into_iter()
            .filter(|r| field_eq(r, "status", status))
            .collect())
    }

    pub async fn by_reporter(&self, reporter: &str, window: &DateWindow) -> AmlResult<Vec<Record>> {
        let records = self.get_records(window).await?;
        Ok(records
            .into_iter()
            .filter(|r| field_eq(r, "reporter", reporter))
            .collect())
    }

    pub async fn kpis(&self, window: &DateWindow) -> AmlResult<GoamlKpis> {
        let key = aggregates_key(AggregateKind::Goaml, window);
        if let Some(kpis) = self.ctx.lookup(Domain::Aggregates, &key).await {
            return Ok(kpis);
        }

        let records = self.get_records(window).await?;
        let kpis = GoamlKpis::compute(&records);
        self.ctx.store_aggregate(&key, &kpis).await?;
        Ok(kpis)
    }

    pub async fn trends(&self, window: &DateWindow) -> AmlResult<Vec<DatedCount>> {
        let records = self.get_records(window).await?;
        Ok(daily_trend(&records, DATE_FIELDS))
    }

    /// Reports per reporter, busiest first.
    pub async fn reporter_stats(&self, window: &DateWindow) -> AmlResult<Vec<LabelCount>> {
        let records = self.get_records(window).await?;
        Ok(distribution(&records, "reporter"))
    }

    pub async fn status_distribution(&self, window: &DateWindow) -> AmlResult<Vec<LabelCount>> {
        let records = self.get_records(window).await?;
        Ok(distribution(&records, "status"))
    }
}

#[async_trait]
impl WarmableDomain for GoamlService {
    fn domain(&self) -> Domain {
        Domain::Goaml
    }

    async fn cold_load(&self, window: &DateWindow) -> AmlResult<Vec<Record>> {
        let records = self.load(window).await?;
        self.ctx.store_records(&goaml_key(window, None), &records).await?;
        info!(window = %window, count = records.len(), "Cached goAML reports");
        Ok(records)
    }

    async fn cache_kpis(&self, window: &DateWindow, records: &[Record]) -> AmlResult<()> {
        let kpis = GoamlKpis::compute(records);
        self.ctx
            .store_aggregate(&aggregates_key(AggregateKind::Goaml, window), &kpis)
            .await
    }
}
