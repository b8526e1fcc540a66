//! Transaction-monitoring detections
//!
//! Alerts come from the AML database only.

use super::{ServiceContext, WarmableDomain};
use amlwatch_connectors::{SourceId, SourceQuery, SqlParam};
use amlwatch_core::keys::{aggregates_key, detections_key};
use amlwatch_core::kpi::{daily_trend, distribution, DatedCount, LabelCount};
use amlwatch_core::record::field_eq;
use amlwatch_core::{AggregateKind, AmlResult, DateWindow, DetectionKpis, Domain, Record};
use async_trait::async_trait;
use tracing::info;

const DETECTIONS_SQL: &str = "\
SELECT id, scenario_name, status, detection_date, status_change_date, modified_by
FROM detections
WHERE detection_date::date >= $1 AND detection_date::date <= $2
ORDER BY detection_date DESC";

pub const DATE_FIELDS: &[&str] = &["DETECTION_DATE"];

#[derive(Clone)]
pub struct DetectionsService {
    ctx: ServiceContext,
}

impl DetectionsService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    async fn load(&self, window: &DateWindow) -> AmlResult<Vec<Record>> {
        let query = SourceQuery::sql(
            DETECTIONS_SQL,
            vec![SqlParam::Date(window.start()), SqlParam::Date(window.end())],
        );
        self.ctx.query_source(SourceId::AmlDb, &query).await
    }

    /// All detections in `window`, cache first.
    pub async fn get_records(&self, window: &DateWindow) -> AmlResult<Vec<Record>> {
        let key = detections_key(window, None);
        if let Some(records) = self.ctx.lookup(Domain::Detections, &key).await {
            return Ok(records);
        }

        let records = self
            .load(window)
            .await
            .map_err(|e| e.in_domain(Domain::Detections))?;
        self.ctx.store_records(&key, &records).await?;
        Ok(records)
    }

    pub async fn by_scenario(&self, scenario: &str, window: &DateWindow) -> AmlResult<Vec<Record>> {
        let records = self.get_records(window).await?;
        Ok(records
            .into_iter()
            .filter(|r| field_eq(r, "SCENARIO_NAME", scenario))
            .collect())
    }

    pub async fn by_status(&self, status: &str, window: &DateWindow) -> AmlResult<Vec<Record>> {
        let records = self.get_records(window).await?;
        Ok(records
            .into_iter()
            .filter(|r| field_eq(r, "STATUS", status))
            .collect())
    }

    /// KPI snapshot under the aggregates key, recomputed only on a miss.
    pub async fn kpis(&self, window: &DateWindow) -> AmlResult<DetectionKpis> {
        let key = aggregates_key(AggregateKind::Detections, window);
        if let Some(kpis) = self.ctx.lookup(Domain::Aggregates, &key).await {
            return Ok(kpis);
        }

        let records = self.get_records(window).await?;
        let kpis = DetectionKpis::compute(&records);
        self.ctx.store_aggregate(&key, &kpis).await?;
        Ok(kpis)
    }

    /// Alerts per day, oldest first.
    pub async fn alert_trends(&self, window: &DateWindow) -> AmlResult<Vec<DatedCount>> {
        let records = self.get_records(window).await?;
        Ok(daily_trend(&records, DATE_FIELDS))
    }

    pub async fn scenario_distribution(&self, window: &DateWindow) -> AmlResult<Vec<LabelCount>> {
        let records = self.get_records(window).await?;
        Ok(distribution(&records, "SCENARIO_NAME"))
    }

    pub async fn status_distribution(&self, window: &DateWindow) -> AmlResult<Vec<LabelCount>> {
        let records = self.get_records(window).await?;
        Ok(distribution(&records, "STATUS"))
    }
}

#[async_trait]
impl WarmableDomain for DetectionsService {
    fn domain(&self) -> Domain {
        Domain::Detections
    }

    async fn cold_load(&self, window: &DateWindow) -> AmlResult<Vec<Record>> {
        let records = self.load(window).await?;
        self.ctx
            .store_records(&detections_key(window, None), &records)
            .await?;
        info!(window = %window, count = records.len(), "Cached detections");
        Ok(records)
    }

    async fn cache_kpis(&self, window: &DateWindow, records: &[Record]) -> AmlResult<()> {
        let kpis = DetectionKpis::compute(records);
        self.ctx
            .store_aggregate(&aggregates_key(AggregateKind::Detections, window), &kpis)
            .await
    }
}
