//! Cache key scheme
//!
//! Keys have the shape `{domain}:{filter|all}:{start}:{end}`. Derivation is
//! pure so that every reader and the warmer agree on the same key for the
//! same inputs; the key string is the only identity a cached payload has.

use crate::window::DateWindow;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Filter segment used when no filter is supplied.
pub const DEFAULT_FILTER: &str = "all";

// ============================================================================
// DOMAINS
// ============================================================================

/// Top-level namespace of a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Detections,
    Screening,
    Goaml,
    Aggregates,
}

impl Domain {
    /// All domains, in eviction order.
    pub const ALL: [Domain; 4] = [
        Domain::Detections,
        Domain::Screening,
        Domain::Goaml,
        Domain::Aggregates,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            Domain::Detections => "detections",
            Domain::Screening => "screening",
            Domain::Goaml => "goaml",
            Domain::Aggregates => "aggregates",
        }
    }

    /// Glob matching every key in this domain.
    pub fn pattern(&self) -> String {
        format!("{}:*", self.prefix())
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Discriminator for the per-source screening caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreeningSource {
    Oracle,
    Sheet,
}

impl ScreeningSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreeningSource::Oracle => "oracle",
            ScreeningSource::Sheet => "sheet",
        }
    }
}

/// Which KPI snapshot an aggregates key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    Detections,
    Screening,
    Goaml,
}

impl AggregateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Detections => "detections",
            AggregateKind::Screening => "screening",
            AggregateKind::Goaml => "goaml",
        }
    }
}

impl From<AggregateKind> for Domain {
    fn from(kind: AggregateKind) -> Self {
        match kind {
            AggregateKind::Detections => Domain::Detections,
            AggregateKind::Screening => Domain::Screening,
            AggregateKind::Goaml => Domain::Goaml,
        }
    }
}

// ============================================================================
// KEYS
// ============================================================================

/// A fully derived cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    fn compose(domain: Domain, filter: Option<&str>, window: &DateWindow) -> Self {
        let filter = match filter {
            Some(f) if !f.is_empty() => f,
            _ => DEFAULT_FILTER,
        };
        Self(format!(
            "{}:{}:{}:{}",
            domain.prefix(),
            filter,
            window.start(),
            window.end()
        ))
    }

    /// Wrap a key composed elsewhere, e.g. one listed by the store.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Domain segment of the key, if it names a known domain.
    pub fn domain(&self) -> Option<Domain> {
        let prefix = self.0.split(':').next()?;
        Domain::ALL.into_iter().find(|d| d.prefix() == prefix)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `detections:{filter|all}:{start}:{end}`
pub fn detections_key(window: &DateWindow, filter: Option<&str>) -> CacheKey {
    CacheKey::compose(Domain::Detections, filter, window)
}

/// `screening:{oracle|sheet|all}:{start}:{end}`
pub fn screening_key(window: &DateWindow, source: Option<ScreeningSource>) -> CacheKey {
    CacheKey::compose(Domain::Screening, source.map(|s| s.as_str()), window)
}

/// `goaml:{filter|all}:{start}:{end}`
pub fn goaml_key(window: &DateWindow, filter: Option<&str>) -> CacheKey {
    CacheKey::compose(Domain::Goaml, filter, window)
}

/// `aggregates:{kind}:{start}:{end}`
pub fn aggregates_key(kind: AggregateKind, window: &DateWindow) -> CacheKey {
    CacheKey::compose(Domain::Aggregates, Some(kind.as_str()), window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn q1_2024() -> DateWindow {
        DateWindow::parse("2024-01-01", "2024-03-31").unwrap()
    }

    #[test]
    fn test_default_filter_is_all() {
        let window = q1_2024();
        assert_eq!(
            detections_key(&window, None).as_str(),
            "detections:all:2024-01-01:2024-03-31"
        );
        assert_eq!(detections_key(&window, Some("")), detections_key(&window, None));
        assert_eq!(
            goaml_key(&window, None).as_str(),
            "goaml:all:2024-01-01:2024-03-31"
        );
    }

    #[test]
    fn test_screening_source_discriminator() {
        let window = q1_2024();
        assert_eq!(
            screening_key(&window, Some(ScreeningSource::Oracle)).as_str(),
            "screening:oracle:2024-01-01:2024-03-31"
        );
        assert_eq!(
            screening_key(&window, Some(ScreeningSource::Sheet)).as_str(),
            "screening:sheet:2024-01-01:2024-03-31"
        );
        assert_eq!(
            screening_key(&window, None).as_str(),
            "screening:all:2024-01-01:2024-03-31"
        );
    }

    #[test]
    fn test_aggregates_key_and_domain_lookup() {
        let key = aggregates_key(AggregateKind::Detections, &q1_2024());
        assert_eq!(key.as_str(), "aggregates:detections:2024-01-01:2024-03-31");
        assert_eq!(key.domain(), Some(Domain::Aggregates));
    }

    #[test]
    fn test_domain_patterns() {
        let patterns: Vec<String> = Domain::ALL.iter().map(|d| d.pattern()).collect();
        assert_eq!(
            patterns,
            vec!["detections:*", "screening:*", "goaml:*", "aggregates:*"]
        );
    }

    fn window_strategy() -> impl Strategy<Value = DateWindow> {
        (0i64..20_000, 0i64..400).prop_map(|(offset, len)| {
            let start = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap() + chrono::Duration::days(offset);
            let end = start + chrono::Duration::days(len);
            DateWindow::new(start, end).unwrap()
        })
    }

    proptest! {
        #[test]
        fn prop_keys_are_deterministic(window in window_strategy(), filter in "[a-zA-Z_/ ]{0,12}") {
            prop_assert_eq!(
                detections_key(&window, Some(&filter)),
                detections_key(&window, Some(&filter))
            );
            prop_assert_eq!(goaml_key(&window, Some(&filter)), goaml_key(&window, Some(&filter)));
        }

        #[test]
        fn prop_distinct_filters_never_collide(
            window in window_strategy(),
            a in "[a-z_]{1,12}",
            b in "[a-z_]{1,12}",
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(detections_key(&window, Some(&a)), detections_key(&window, Some(&b)));
        }

        #[test]
        fn prop_distinct_windows_never_collide(a in window_strategy(), b in window_strategy()) {
            prop_assume!(a != b);
            prop_assert_ne!(detections_key(&a, None), detections_key(&b, None));
        }
    }
}
