//! KPI snapshots and record grouping
//!
//! Snapshots are derived from one domain's records for one window. They are
//! plain data, serialized with the camelCase field names the dashboard reads.

use crate::record::{field_date, field_eq, field_str, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// DETECTIONS
// ============================================================================

pub mod detection_status {
    pub const NEW: &str = "New";
    pub const DELAYED: &str = "Delayed";
    pub const SUSPICIOUS_INITIAL: &str = "Suspicious Initial";
    pub const FALSE_POSITIVE_INITIAL: &str = "False Positive Initial";
    pub const WAITING_FOR_EVIDENCE: &str = "Waiting for Evidence";
    pub const SENT_SAR: &str = "Sent SAR";
    pub const SUSPICIOUS_FINAL: &str = "Suspicious Final";
    pub const FALSE_POSITIVE_FINAL: &str = "False Positive Final";
}

/// Statuses that close an alert.
const PROCESSED_STATUSES: [&str; 3] = [
    detection_status::SENT_SAR,
    detection_status::SUSPICIOUS_FINAL,
    detection_status::FALSE_POSITIVE_FINAL,
];

/// Open statuses that count toward pending SAR for SAR-bearing scenarios.
const PENDING_SAR_STATUSES: [&str; 4] = [
    detection_status::NEW,
    detection_status::DELAYED,
    detection_status::WAITING_FOR_EVIDENCE,
    detection_status::SUSPICIOUS_INITIAL,
];

const SAR_SCENARIOS: [&str; 2] = ["CO", "SAR"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionKpis {
    pub alert_count: u64,
    pub pending_count: u64,
    pub delayed_count: u64,
    pub suspicious_initial_count: u64,
    pub false_positive_initial_count: u64,
    pub waiting_for_evidence_count: u64,
    #[serde(rename = "sentSARCount")]
    pub sent_sar_count: u64,
    pub suspicious_final_count: u64,
    pub false_positive_final_count: u64,
    pub processed_alerts_count: u64,
    #[serde(rename = "pendingSARCount")]
    pub pending_sar_count: u64,
}

impl DetectionKpis {
    pub fn compute(records: &[Record]) -> Self {
        let mut kpis = Self {
            alert_count: records.len() as u64,
            ..Self::default()
        };

        for record in records {
            let status = field_str(record, "STATUS");
            let status = status.as_deref().unwrap_or_default();
            match status {
                detection_status::NEW => kpis.pending_count += 1,
                detection_status::DELAYED => kpis.delayed_count += 1,
                detection_status::SUSPICIOUS_INITIAL => kpis.suspicious_initial_count += 1,
                detection_status::FALSE_POSITIVE_INITIAL => kpis.false_positive_initial_count += 1,
                detection_status::WAITING_FOR_EVIDENCE => kpis.waiting_for_evidence_count += 1,
                detection_status::SENT_SAR => kpis.sent_sar_count += 1,
                detection_status::SUSPICIOUS_FINAL => kpis.suspicious_final_count += 1,
                detection_status::FALSE_POSITIVE_FINAL => kpis.false_positive_final_count += 1,
                _ => {}
            }

            if PROCESSED_STATUSES.contains(&status) {
                kpis.processed_alerts_count += 1;
            }

            let sar_scenario = field_str(record, "SCENARIO_NAME")
                .is_some_and(|s| SAR_SCENARIOS.contains(&s.as_str()));
            if sar_scenario && PENDING_SAR_STATUSES.contains(&status) {
                kpis.pending_sar_count += 1;
            }
        }

        kpis
    }
}

// ============================================================================
// SCREENING
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreeningKpis {
    pub total_screening: u64,
    pub pending_screening: u64,
    pub completed_screening: u64,
    /// Percentage of records carrying a hit type, 0 when there are none.
    pub hit_rate: f64,
}

impl ScreeningKpis {
    pub fn compute(records: &[Record]) -> Self {
        let total = records.len() as u64;
        let pending = records.iter().filter(|r| field_eq(r, "STATUS", "Pending")).count() as u64;
        let completed = records
            .iter()
            .filter(|r| field_eq(r, "STATUS", "Completed"))
            .count() as u64;
        let hits = records
            .iter()
            .filter(|r| field_str(r, "HIT_TYPE").is_some())
            .count();

        let hit_rate = if total > 0 {
            hits as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total_screening: total,
            pending_screening: pending,
            completed_screening: completed,
            hit_rate,
        }
    }
}

// ============================================================================
// GOAML
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoamlKpis {
    pub total_reports: u64,
    pub submitted_reports: u64,
    pub pending_reports: u64,
    pub draft_reports: u64,
}

impl GoamlKpis {
    pub fn compute(records: &[Record]) -> Self {
        let count = |status: &str| records.iter().filter(|r| field_eq(r, "status", status)).count() as u64;
        Self {
            total_reports: records.len() as u64,
            submitted_reports: count("Submitted"),
            pending_reports: count("Pending"),
            draft_reports: count("Draft"),
        }
    }
}

// ============================================================================
// GROUPING
// ============================================================================

/// Count of records for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedCount {
    pub date: String,
    pub count: u64,
}

/// Count of records sharing one field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

/// Per-day counts in ascending date order. Undated records are skipped.
pub fn daily_trend(records: &[Record], date_fields: &[&str]) -> Vec<DatedCount> {
    let mut days: BTreeMap<String, u64> = BTreeMap::new();
    for record in records {
        if let Some(date) = field_date(record, date_fields) {
            *days.entry(date.to_string()).or_default() += 1;
        }
    }
    days.into_iter()
        .map(|(date, count)| DatedCount { date, count })
        .collect()
}

/// Counts per value of `field_name`, missing values grouped as `Unknown`.
/// Sorted by descending count, then label.
pub fn distribution(records: &[Record], field_name: &str) -> Vec<LabelCount> {
    let mut groups: BTreeMap<String, u64> = BTreeMap::new();
    for record in records {
        let label = field_str(record, field_name).unwrap_or_else(|| "Unknown".to_string());
        *groups.entry(label).or_default() += 1;
    }
    let mut out: Vec<LabelCount> = groups
        .into_iter()
        .map(|(label, count)| LabelCount { label, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    out
}
