//! Sliding date window
//!
//! A `DateWindow` is an inclusive pair of calendar dates. The "current"
//! window is always the trailing N months ending today.

use crate::error::ValidationError;
use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Days per month used by the retention cutoff.
pub const RETENTION_DAYS_PER_MONTH: u64 = 30;

/// Inclusive calendar date range, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct DateWindow {
    #[serde(rename = "startDate")]
    start: NaiveDate,
    #[serde(rename = "endDate")]
    end: NaiveDate,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWindow {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl TryFrom<RawWindow> for DateWindow {
    type Error = ValidationError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        DateWindow::new(raw.start_date, raw.end_date)
    }
}

impl DateWindow {
    /// Create a window, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedWindow {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// `[today - months, today]`, clamping to the last day of shorter months.
    pub fn trailing_months(today: NaiveDate, months: u32) -> Self {
        let start = today
            .checked_sub_months(Months::new(months))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end: today }
    }

    /// Parse `YYYY-MM-DD` bounds as supplied by query strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, ValidationError> {
        let start = parse_date("startDate", start)?;
        let end = parse_date("endDate", end)?;
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Inclusive on both ends.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered, counting both bounds.
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Oldest date retained by the daily update: `today - months * 30 days`.
pub fn retention_cutoff(today: NaiveDate, months: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(months) * RETENTION_DAYS_PER_MONTH))
        .unwrap_or(NaiveDate::MIN)
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ValidationError::InvalidDate {
        field: field.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_rejects_inverted_window() {
        let result = DateWindow::new(date(2024, 3, 31), date(2024, 1, 1));
        assert!(matches!(result, Err(ValidationError::InvertedWindow { .. })));
    }

    #[test]
    fn test_single_day_window_is_valid() {
        let window = DateWindow::new(date(2024, 2, 29), date(2024, 2, 29)).unwrap();
        assert_eq!(window.len_days(), 1);
        assert!(window.contains(date(2024, 2, 29)));
    }

    #[test]
    fn test_trailing_months_clamps_month_end() {
        let window = DateWindow::trailing_months(date(2024, 5, 31), 3);
        assert_eq!(window.start(), date(2024, 2, 29));
        assert_eq!(window.end(), date(2024, 5, 31));
    }

    #[test]
    fn test_contains_is_inclusive() {
        let window = DateWindow::new(date(2024, 1, 1), date(2024, 3, 31)).unwrap();
        assert!(window.contains(date(2024, 1, 1)));
        assert!(window.contains(date(2024, 3, 31)));
        assert!(!window.contains(date(2024, 4, 1)));
        assert!(!window.contains(date(2023, 12, 31)));
    }

    #[test]
    fn test_retention_cutoff_uses_thirty_day_months() {
        assert_eq!(retention_cutoff(date(2024, 4, 1), 3), date(2024, 1, 2));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = DateWindow::parse("2024-01-01", "yesterday").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidDate { ref field, .. } if field == "endDate"));
    }

    #[test]
    fn test_serde_uses_camel_case_and_validates() {
        let window = DateWindow::parse("2024-01-01", "2024-03-31").unwrap();
        let json = serde_json::to_value(window).unwrap();
        assert_eq!(json["startDate"], "2024-01-01");
        assert_eq!(json["endDate"], "2024-03-31");

        let inverted = serde_json::json!({"startDate": "2024-03-31", "endDate": "2024-01-01"});
        assert!(serde_json::from_value::<DateWindow>(inverted).is_err());
    }

    proptest! {
        #[test]
        fn prop_trailing_window_is_ordered(days in 0i64..40_000, months in 0u32..240) {
            let today = date(1970, 1, 1) + chrono::Duration::days(days);
            let window = DateWindow::trailing_months(today, months);
            prop_assert!(window.start() <= window.end());
            prop_assert_eq!(window.end(), today);
        }
    }
}
