//! In-memory filtering over a record set.
//!
//! A [`FilterConfig`] is a conjunction of predicates. Each multi-value
//! predicate is a disjunction over its set, and an empty set matches
//! everything, so the default configuration excludes nothing.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{FeatureRecord, ReleaseStatus};

/// Inclusive GA-date window. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn is_active(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Records without a date never fall inside an active range.
    pub fn contains(&self, date: Option<NaiveDate>) -> bool {
        let Some(date) = date else {
            return false;
        };
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    GaDate,
    LastUpdated,
    ProductName,
    FeatureName,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GaDate => "ga_date",
            Self::LastUpdated => "last_updated",
            Self::ProductName => "product_name",
            Self::FeatureName => "feature_name",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ga_date" => Some(Self::GaDate),
            "last_updated" => Some(Self::LastUpdated),
            "product_name" => Some(Self::ProductName),
            "feature_name" => Some(Self::FeatureName),
            _ => None,
        }
    }
}

/// An explicit ordering. Absent values sort last in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub key: SortKey,
    #[serde(default)]
    pub descending: bool,
}

impl SortOrder {
    /// Parse `key` or `-key` (descending).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (descending, key) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        SortKey::from_str(key).map(|key| Self { key, descending })
    }
}

/// Active filters over a record set. Serializes to JSON for saved views.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub products: BTreeSet<String>,
    pub statuses: BTreeSet<ReleaseStatus>,
    /// Matched against the combined release wave.
    pub waves: BTreeSet<String>,
    pub investment_areas: BTreeSet<String>,
    pub enabled_for: BTreeSet<String>,
    pub ga_range: Option<DateRange>,
    /// Case-insensitive substring over every textual attribute.
    pub search: Option<String>,
    pub sort: Option<SortOrder>,
}

impl FilterConfig {
    /// Whether no predicate is active.
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
            && self.statuses.is_empty()
            && self.waves.is_empty()
            && self.investment_areas.is_empty()
            && self.enabled_for.is_empty()
            && !self.ga_range.is_some_and(|r| r.is_active())
            && self.search_needle().is_none()
    }

    fn search_needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, record: &FeatureRecord, today: NaiveDate) -> bool {
        self.matches_with_needle(record, today, self.search_needle().as_deref())
    }

    fn matches_with_needle(
        &self,
        record: &FeatureRecord,
        today: NaiveDate,
        needle: Option<&str>,
    ) -> bool {
        in_set(&self.products, Some(record.product_name.as_str()))
            && (self.statuses.is_empty() || self.statuses.contains(&record.status(today)))
            && in_set(&self.waves, record.release_wave())
            && in_set(&self.investment_areas, record.investment_area.as_deref())
            && in_set(&self.enabled_for, record.enabled_for.as_deref())
            && self
                .ga_range
                .filter(DateRange::is_active)
                .is_none_or(|range| range.contains(record.ga_date))
            && needle.is_none_or(|needle| {
                record
                    .text_fields()
                    .any(|text| text.to_lowercase().contains(needle))
            })
    }
}

fn in_set(selected: &BTreeSet<String>, value: Option<&str>) -> bool {
    selected.is_empty() || value.is_some_and(|v| selected.contains(v))
}

/// Return the records matching `config`, in input order unless the config
/// requests a sort.
pub fn filter_records<'a>(
    records: &'a [FeatureRecord],
    config: &FilterConfig,
    today: NaiveDate,
) -> Vec<&'a FeatureRecord> {
    let needle = config.search_needle();
    let mut matched: Vec<&FeatureRecord> = records
        .iter()
        .filter(|r| config.matches_with_needle(r, today, needle.as_deref()))
        .collect();

    if let Some(order) = config.sort {
        sort_records(&mut matched, order);
    }
    matched
}

/// Stable sort by `order`; records missing the key go last.
pub fn sort_records(records: &mut [&FeatureRecord], order: SortOrder) {
    records.sort_by(|a, b| match order.key {
        SortKey::GaDate => compare_present(a.ga_date, b.ga_date, order.descending),
        SortKey::LastUpdated => compare_present(a.last_updated, b.last_updated, order.descending),
        SortKey::ProductName => compare_present(
            Some(a.product_name.to_lowercase()),
            Some(b.product_name.to_lowercase()),
            order.descending,
        ),
        SortKey::FeatureName => compare_present(
            Some(a.feature_name.to_lowercase()),
            Some(b.feature_name.to_lowercase()),
            order.descending,
        ),
    });
}

fn compare_present<T: Ord>(a: Option<T>, b: Option<T>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if descending => b.cmp(&a),
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn today() -> NaiveDate {
        date("2024-08-01")
    }

    fn records() -> Vec<FeatureRecord> {
        let mut sales = FeatureRecord::new("RP-1", "Dynamics 365 Sales", "Lead scoring");
        sales.ga_date = Some(date("2024-05-01"));
        sales.investment_area = Some("Copilot".to_string());
        sales.ga_release_wave = Some("2024 release wave 1".to_string());

        let mut apps = FeatureRecord::new("RP-2", "Power Apps", "Offline forms");
        apps.preview_date = Some(date("2024-07-01"));
        apps.ga_date = Some(date("2024-11-01"));
        apps.business_value = Some("Work from ANYWHERE".to_string());
        apps.ga_release_wave = Some("2024 release wave 2".to_string());

        let mut bc = FeatureRecord::new("RP-3", "Dynamics 365 Business Central", "Bank sync");
        bc.enabled_for = Some("Admins".to_string());

        vec![sales, apps, bc]
    }

    fn ids(records: &[&FeatureRecord]) -> Vec<String> {
        records.iter().map(|r| r.release_plan_id.clone()).collect()
    }

    #[test]
    fn empty_config_returns_everything_in_order() {
        let records = records();
        let config = FilterConfig::default();
        assert!(config.is_empty());
        assert_eq!(ids(&filter_records(&records, &config, today())), ["RP-1", "RP-2", "RP-3"]);
    }

    #[test]
    fn multi_value_filters_are_disjunctions() {
        let records = records();
        let config = FilterConfig {
            products: ["Power Apps", "Dynamics 365 Business Central"]
                .into_iter()
                .map(String::from)
                .collect(),
            ..Default::default()
        };
        assert_eq!(ids(&filter_records(&records, &config, today())), ["RP-2", "RP-3"]);
    }

    #[test]
    fn predicates_are_conjoined() {
        let records = records();
        let config = FilterConfig {
            statuses: [ReleaseStatus::PublicPreview, ReleaseStatus::GenerallyAvailable]
                .into_iter()
                .collect(),
            waves: ["2024 release wave 2".to_string()].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(ids(&filter_records(&records, &config, today())), ["RP-2"]);
    }

    #[test]
    fn absent_values_do_not_match_active_set() {
        let records = records();
        let config = FilterConfig {
            enabled_for: ["Admins".to_string()].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(ids(&filter_records(&records, &config, today())), ["RP-3"]);
    }

    #[test]
    fn search_is_case_insensitive_across_text_fields() {
        let records = records();
        let config = FilterConfig {
            search: Some("anywhere".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&filter_records(&records, &config, today())), ["RP-2"]);

        let config = FilterConfig {
            search: Some("COPILOT".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&filter_records(&records, &config, today())), ["RP-1"]);
    }

    #[test]
    fn blank_search_is_inactive() {
        let config = FilterConfig {
            search: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(config.is_empty());
    }

    #[test]
    fn ga_range_is_inclusive_and_excludes_missing_dates() {
        let records = records();
        let config = FilterConfig {
            ga_range: Some(DateRange {
                start: Some(date("2024-05-01")),
                end: Some(date("2024-11-01")),
            }),
            ..Default::default()
        };
        assert_eq!(ids(&filter_records(&records, &config, today())), ["RP-1", "RP-2"]);

        let open_start = FilterConfig {
            ga_range: Some(DateRange {
                start: None,
                end: Some(date("2024-06-01")),
            }),
            ..Default::default()
        };
        assert_eq!(ids(&filter_records(&records, &open_start, today())), ["RP-1"]);
    }

    #[test]
    fn sort_puts_missing_keys_last_in_both_directions() {
        let records = records();
        let mut config = FilterConfig {
            sort: SortOrder::parse("ga_date"),
            ..Default::default()
        };
        assert_eq!(ids(&filter_records(&records, &config, today())), ["RP-1", "RP-2", "RP-3"]);

        config.sort = SortOrder::parse("-ga_date");
        assert_eq!(ids(&filter_records(&records, &config, today())), ["RP-2", "RP-1", "RP-3"]);
    }

    #[test]
    fn sort_order_parsing() {
        assert_eq!(
            SortOrder::parse("-product_name"),
            Some(SortOrder {
                key: SortKey::ProductName,
                descending: true
            })
        );
        assert_eq!(SortOrder::parse("priority"), None);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config: FilterConfig = serde_json::from_str(
            r#"{"statuses": ["planned"], "ga_range": {"start": "2024-01-01", "end": null}}"#,
        )
        .unwrap();
        assert!(config.statuses.contains(&ReleaseStatus::Planned));
        assert_eq!(config.ga_range.unwrap().start, Some(date("2024-01-01")));
    }
}
