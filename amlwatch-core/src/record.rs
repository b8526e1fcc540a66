//! Row records
//!
//! Every connector returns rows as field-name keyed JSON maps. Relational
//! sources tend to report upper-case column names and sheets report whatever
//! the header row says, so lookups here are case-insensitive.

use crate::window::DateWindow;
use chrono::NaiveDate;
use serde_json::{Map, Value};

/// One row from an upstream source.
pub type Record = Map<String, Value>;

/// Case-insensitive field lookup. Exact matches win.
pub fn field<'a>(record: &'a Record, name: &str) -> Option<&'a Value> {
    record.get(name).or_else(|| {
        record
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}

/// Field as a non-empty string. Numbers and booleans are rendered.
pub fn field_str(record: &Record, name: &str) -> Option<String> {
    match field(record, name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Whether `name` holds exactly `expected` (trimmed, case-sensitive value).
pub fn field_eq(record: &Record, name: &str, expected: &str) -> bool {
    field_str(record, name).as_deref() == Some(expected)
}

/// First parseable date among `names`. Only the leading `YYYY-MM-DD` is read,
/// so full timestamps are accepted.
pub fn field_date(record: &Record, names: &[&str]) -> Option<NaiveDate> {
    names.iter().find_map(|name| {
        let raw = field_str(record, name)?;
        let head = raw.get(..10)?;
        NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
    })
}

/// Map a header row plus data rows into records.
///
/// Row 0 names the fields. Short rows and empty cells become `null`; cells
/// beyond the header width are dropped. No data rows yields an empty vec.
pub fn rows_to_records(rows: &[Vec<Value>]) -> Vec<Record> {
    let Some((header, data)) = rows.split_first() else {
        return Vec::new();
    };
    let names: Vec<String> = header
        .iter()
        .map(|cell| match cell {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();

    data.iter()
        .map(|row| {
            names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let value = match row.get(i) {
                        None | Some(Value::Null) => Value::Null,
                        Some(Value::String(s)) if s.is_empty() => Value::Null,
                        Some(v) => v.clone(),
                    };
                    (name.clone(), value)
                })
                .collect()
        })
        .collect()
}

/// Keep records whose first parseable date field falls inside `window`.
/// Records with no usable date are dropped.
pub fn filter_by_window(records: Vec<Record>, window: &DateWindow, date_fields: &[&str]) -> Vec<Record> {
    records
        .into_iter()
        .filter(|r| field_date(r, date_fields).is_some_and(|d| window.contains(d)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_field_lookup_ignores_case() {
        let r = record(json!({"STATUS": "New", "scenario": "CO/SAR"}));
        assert_eq!(field_str(&r, "status").as_deref(), Some("New"));
        assert_eq!(field_str(&r, "SCENARIO").as_deref(), Some("CO/SAR"));
        assert!(field(&r, "missing").is_none());
    }

    #[test]
    fn test_field_str_skips_blank_and_null() {
        let r = record(json!({"a": "  ", "b": null, "c": 42}));
        assert!(field_str(&r, "a").is_none());
        assert!(field_str(&r, "b").is_none());
        assert_eq!(field_str(&r, "c").as_deref(), Some("42"));
    }

    #[test]
    fn test_rows_to_records_pads_short_rows() {
        let rows = vec![
            vec![json!("date"), json!("status"), json!("customer_id")],
            vec![json!("2024-02-01"), json!("Submitted")],
            vec![json!("2024-02-02"), json!(""), json!("C1"), json!("extra")],
        ];
        let records = rows_to_records(&rows);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["customer_id"], Value::Null);
        assert_eq!(records[1]["status"], Value::Null);
        assert_eq!(records[1]["customer_id"], "C1");
        assert_eq!(records[1].len(), 3);
    }

    #[test]
    fn test_rows_to_records_header_only() {
        assert!(rows_to_records(&[vec![json!("date")]]).is_empty());
        assert!(rows_to_records(&[]).is_empty());
    }

    #[test]
    fn test_filter_by_window_drops_out_of_range_and_undated() {
        let window = DateWindow::parse("2024-01-01", "2024-03-31").unwrap();
        let records = vec![
            record(json!({"date": "2024-02-01", "status": "Submitted"})),
            record(json!({"date": "2024-04-01", "status": "Submitted"})),
            record(json!({"status": "Draft"})),
            record(json!({"date": "not a date"})),
            record(json!({"screening_date": "2024-03-31T23:59:00Z", "date": "2020-01-01"})),
        ];
        let kept = filter_by_window(records, &window, &["screening_date", "date"]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0]["date"], "2024-02-01");
    }
}
