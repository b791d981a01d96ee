use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::{parse_document, FeedError, RawPage};
use crate::models::FeatureRecord;

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Placeholders the feed uses instead of leaving a date blank.
const DATE_SENTINELS: &[&str] = &["tbd", "n/a", "na", "none", "null", "-"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Why a single feed entry was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryParseError {
    #[error("entry is not an object")]
    NotAnObject,

    #[error("entry has no feature name")]
    MissingFeatureName,

    #[error("entry has no release plan id")]
    MissingReleasePlanId,

    #[error("duplicate release plan id {0}")]
    DuplicateId(String),
}

/// A skipped entry and where it sat in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Zero-based page index.
    pub page: usize,
    /// Zero-based position within the page's `results`.
    pub position: usize,
    pub error: EntryParseError,
}

/// The result of normalizing a feed.
#[derive(Debug, Clone, Default)]
pub struct NormalizedFeed {
    /// Parsed records in feed order.
    pub records: Vec<FeatureRecord>,
    pub skipped: Vec<SkippedEntry>,
    /// Record count as reported by the first page, if any.
    pub reported_total: Option<u64>,
    pub pages: usize,
}

impl NormalizedFeed {
    pub fn parsed_count(&self) -> usize {
        self.records.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Wire shape of one feed entry. Values stay loosely typed: the feed mixes
/// strings, numbers and nulls for the same column.
#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "Release Plan ID")]
    release_plan_id: Option<Value>,
    #[serde(rename = "ProductId")]
    product_id: Option<Value>,
    #[serde(rename = "Product name")]
    product_name: Option<Value>,
    #[serde(rename = "Feature name")]
    feature_name: Option<Value>,
    #[serde(rename = "Investment area")]
    investment_area: Option<Value>,
    #[serde(rename = "Business value")]
    business_value: Option<Value>,
    #[serde(rename = "Feature details")]
    feature_details: Option<Value>,
    #[serde(rename = "Enabled for")]
    enabled_for: Option<Value>,
    #[serde(rename = "GA Release Wave")]
    ga_release_wave: Option<Value>,
    #[serde(rename = "Public Preview Release Wave")]
    preview_release_wave: Option<Value>,
    #[serde(rename = "Early access date")]
    early_access_date: Option<Value>,
    #[serde(rename = "Public preview date")]
    preview_date: Option<Value>,
    #[serde(rename = "GA date")]
    ga_date: Option<Value>,
    #[serde(rename = "Last Gitcommit date")]
    last_updated: Option<Value>,
}

/// Concatenate feed pages into one ordered sequence of records.
///
/// Pages are consumed until one reports `morerecords: false`. Malformed
/// entries are skipped and reported in [`NormalizedFeed::skipped`]; the call
/// only fails when not a single entry could be parsed.
pub fn normalize_pages<I>(pages: I) -> Result<NormalizedFeed, FeedError>
where
    I: IntoIterator<Item = RawPage>,
{
    let mut feed = NormalizedFeed::default();
    let mut seen = HashSet::new();

    for (page_index, page) in pages.into_iter().enumerate() {
        feed.pages += 1;
        if feed.reported_total.is_none() {
            feed.reported_total = page.total_records();
        }
        let has_more = page.has_more();

        for (position, entry) in page.results.into_iter().enumerate() {
            let parsed = parse_entry(entry).and_then(|record| {
                if seen.insert(record.release_plan_id.clone()) {
                    Ok(record)
                } else {
                    Err(EntryParseError::DuplicateId(record.release_plan_id))
                }
            });

            match parsed {
                Ok(record) => feed.records.push(record),
                Err(error) => {
                    tracing::debug!(page = page_index, position, %error, "Skipping feed entry");
                    feed.skipped.push(SkippedEntry {
                        page: page_index,
                        position,
                        error,
                    });
                }
            }
        }

        if !has_more {
            break;
        }
    }

    if feed.records.is_empty() {
        return Err(FeedError::NoEntries {
            skipped: feed.skipped.len(),
        });
    }

    if !feed.skipped.is_empty() {
        tracing::warn!(
            "Skipped {} malformed feed entries ({} parsed)",
            feed.skipped.len(),
            feed.records.len()
        );
    }

    Ok(feed)
}

/// Read and normalize a saved copy of the feed.
pub fn load_fallback_file(path: &Path) -> Result<NormalizedFeed, FeedError> {
    let fallback_err = |reason: String| FeedError::Fallback {
        path: path.to_path_buf(),
        reason,
    };

    let text = std::fs::read_to_string(path).map_err(|e| fallback_err(e.to_string()))?;
    let document = parse_document(&text).map_err(|e| fallback_err(e.to_string()))?;
    if document.salvaged {
        tracing::warn!("Fallback file {} is not valid JSON, salvaged entries", path.display());
    }
    normalize_pages(document.pages)
}

fn parse_entry(entry: Value) -> Result<FeatureRecord, EntryParseError> {
    if !entry.is_object() {
        return Err(EntryParseError::NotAnObject);
    }
    let raw: RawEntry =
        serde_json::from_value(entry).map_err(|_| EntryParseError::NotAnObject)?;

    let feature_name = text_value(raw.feature_name.as_ref())
        .and_then(|t| clean_text(&t))
        .ok_or(EntryParseError::MissingFeatureName)?;
    let release_plan_id = text_value(raw.release_plan_id.as_ref())
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or(EntryParseError::MissingReleasePlanId)?;

    let text = |v: Option<Value>| text_value(v.as_ref()).and_then(|t| clean_text(&t));
    let date = |v: Option<Value>| text_value(v.as_ref()).and_then(|t| parse_date(&t));

    Ok(FeatureRecord {
        release_plan_id,
        product_id: text(raw.product_id),
        product_name: text(raw.product_name).unwrap_or_default(),
        feature_name,
        investment_area: text(raw.investment_area),
        business_value: text(raw.business_value),
        feature_details: text(raw.feature_details),
        enabled_for: text(raw.enabled_for),
        ga_release_wave: text(raw.ga_release_wave),
        preview_release_wave: text(raw.preview_release_wave),
        early_access_date: date(raw.early_access_date),
        preview_date: date(raw.preview_date),
        ga_date: date(raw.ga_date),
        last_updated: date(raw.last_updated),
    })
}

fn text_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Strip HTML markup, decode common entities and collapse whitespace.
/// Returns `None` when nothing but whitespace remains.
pub fn clean_text(raw: &str) -> Option<String> {
    let stripped = HTML_TAG.replace_all(raw, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&");
    let collapsed = WHITESPACE.replace_all(&decoded, " ");
    let trimmed = collapsed.trim();

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a feed date. Blank values, placeholders such as `TBD` or `N/A`, and
/// anything unparseable are absent.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() || DATE_SENTINELS.iter().any(|s| raw.eq_ignore_ascii_case(s)) {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
                .map(|dt| dt.date())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn entry(id: &str, name: &str) -> Value {
        json!({
            "Release Plan ID": id,
            "Product name": "Dynamics 365 Sales",
            "Feature name": name,
        })
    }

    fn page(results: Vec<Value>, more: bool) -> RawPage {
        RawPage {
            results,
            totalrecords: Some(json!("3")),
            morerecords: Some(json!(more)),
        }
    }

    #[test]
    fn parses_dates_in_feed_formats() {
        assert_eq!(parse_date("2024-10-01"), Some(date("2024-10-01")));
        assert_eq!(parse_date("10/1/2024"), Some(date("2024-10-01")));
        assert_eq!(parse_date("2024-10-01T00:00:00"), Some(date("2024-10-01")));
        assert_eq!(parse_date("2024-10-01T00:00:00Z"), Some(date("2024-10-01")));
        assert_eq!(parse_date("2024-10-01T08:30:00+02:00"), Some(date("2024-10-01")));
    }

    #[test]
    fn sentinels_and_garbage_are_absent() {
        for raw in ["", "   ", "TBD", "tbd", "N/A", "soon", "2024-13-45"] {
            assert_eq!(parse_date(raw), None, "{raw:?}");
        }
    }

    #[test]
    fn cleans_html_and_whitespace() {
        assert_eq!(
            clean_text("<p>Sell  <b>faster</b>&nbsp;&amp; smarter</p>\n"),
            Some("Sell faster & smarter".to_string())
        );
        assert_eq!(clean_text("<br/>  "), None);
    }

    #[test]
    fn concatenates_pages_until_no_more_records() {
        let feed = normalize_pages(vec![
            page(vec![entry("RP-1", "A"), entry("RP-2", "B")], true),
            page(vec![entry("RP-3", "C")], false),
            page(vec![entry("RP-4", "ignored")], false),
        ])
        .unwrap();

        let ids: Vec<_> = feed.records.iter().map(|r| r.release_plan_id.as_str()).collect();
        assert_eq!(ids, vec!["RP-1", "RP-2", "RP-3"]);
        assert_eq!(feed.pages, 2);
        assert_eq!(feed.reported_total, Some(3));
    }

    #[test]
    fn skips_malformed_entries_and_counts_them() {
        let feed = normalize_pages(vec![page(
            vec![
                entry("RP-1", "A"),
                json!("not an object"),
                json!({"Release Plan ID": "RP-2"}),
                json!({"Feature name": "No id"}),
                entry("RP-1", "Duplicate"),
                entry("RP-3", "C"),
            ],
            false,
        )])
        .unwrap();

        assert_eq!(feed.parsed_count(), 2);
        assert_eq!(feed.skipped_count(), 4);
        let errors: Vec<_> = feed.skipped.iter().map(|s| s.error.clone()).collect();
        assert_eq!(
            errors,
            vec![
                EntryParseError::NotAnObject,
                EntryParseError::MissingFeatureName,
                EntryParseError::MissingReleasePlanId,
                EntryParseError::DuplicateId("RP-1".to_string()),
            ]
        );
        assert_eq!(feed.skipped[3].position, 4);
    }

    #[test]
    fn zero_parseable_entries_is_unavailable() {
        let err = normalize_pages(vec![page(vec![json!(42)], false)]).unwrap_err();
        assert!(matches!(err, FeedError::NoEntries { skipped: 1 }));

        let err = normalize_pages(Vec::new()).unwrap_err();
        assert!(matches!(err, FeedError::NoEntries { skipped: 0 }));
    }

    #[test]
    fn maps_every_field() {
        let feed = normalize_pages(vec![page(
            vec![json!({
                "Release Plan ID": 42,
                "ProductId": "p-1",
                "Product name": "Power Apps",
                "Feature name": " Offline <i>forms</i> ",
                "Investment area": "Mobile",
                "Business value": "<p>Work anywhere</p>",
                "Feature details": "Details",
                "Enabled for": "Users by admins, makers, or analysts",
                "GA Release Wave": "2024 release wave 2",
                "Public Preview Release Wave": "2024 release wave 1",
                "Early access date": "TBD",
                "Public preview date": "4/15/2024",
                "GA date": "2024-10-01",
                "Last Gitcommit date": "2024-03-20T10:00:00",
            })],
            false,
        )])
        .unwrap();

        let record = &feed.records[0];
        assert_eq!(record.release_plan_id, "42");
        assert_eq!(record.feature_name, "Offline forms");
        assert_eq!(record.business_value.as_deref(), Some("Work anywhere"));
        assert_eq!(record.early_access_date, None);
        assert_eq!(record.preview_date, Some(date("2024-04-15")));
        assert_eq!(record.ga_date, Some(date("2024-10-01")));
        assert_eq!(record.last_updated, Some(date("2024-03-20")));
        assert_eq!(record.release_wave(), Some("2024 release wave 2"));
    }
}
