//! Release-plan feed ingestion.
//!
//! The feed is a paginated JSON endpoint. Each page looks like:
//!
//! ```json
//! { "totalrecords": "1234", "morerecords": true, "results": [ { "Feature name": "...", ... } ] }
//! ```
//!
//! [`client::FeedClient`] fetches raw pages, [`normalize::normalize_pages`]
//! turns them into typed [`FeatureRecord`](crate::models::FeatureRecord)s,
//! and [`service::FeedService`] ties both together with a local fallback file
//! and an expiring cache.

pub mod cache;
pub mod client;
pub mod normalize;
mod salvage;
pub mod service;

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub use cache::FeedCache;
pub use client::{ClientError, FeedClient, FetchedPages};
pub use normalize::{
    clean_text, load_fallback_file, normalize_pages, parse_date, EntryParseError,
    NormalizedFeed, SkippedEntry,
};
pub use service::{FeedService, LoadedFeed};

/// Every variant means the feed is unavailable: callers may substitute a
/// cached or local copy, otherwise there is no data.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Network or HTTP failure before any page was retrieved.
    #[error("feed unreachable: {0}")]
    Unreachable(String),

    /// The feed answered but no entry could be parsed.
    #[error("feed returned no parseable entries ({skipped} skipped)")]
    NoEntries { skipped: usize },

    /// The local fallback file could not be read or parsed.
    #[error("fallback file {}: {reason}", path.display())]
    Fallback { path: PathBuf, reason: String },
}

/// One page of the feed as it comes off the wire.
///
/// `totalrecords` and `morerecords` are kept loosely typed because the feed
/// has served both strings and native JSON values for them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPage {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub totalrecords: Option<Value>,
    #[serde(default)]
    pub morerecords: Option<Value>,
}

impl RawPage {
    pub fn with_results(results: Vec<Value>) -> Self {
        Self {
            results,
            ..Self::default()
        }
    }

    pub fn has_more(&self) -> bool {
        match &self.morerecords {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn total_records(&self) -> Option<u64> {
        match &self.totalrecords {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Pages recovered from one JSON document.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub pages: Vec<RawPage>,
    /// The document was not valid JSON and entries were salvaged one by one.
    pub salvaged: bool,
}

/// Parse a feed page body or a saved copy of the feed.
///
/// Accepts a single page object, an array of page objects, or a bare array
/// of entries. When the text is not valid JSON, the objects inside its
/// `results` array are salvaged individually.
pub fn parse_document(text: &str) -> Result<ParsedDocument, serde_json::Error> {
    let value: Value = match serde_json::from_str(text.trim()) {
        Ok(value) => value,
        Err(e) => {
            return match salvage::salvage_results(text) {
                Some(results) => Ok(ParsedDocument {
                    pages: vec![RawPage::with_results(results)],
                    salvaged: true,
                }),
                None => Err(e),
            };
        }
    };

    let pages = match value {
        Value::Array(items) if items.iter().all(is_page) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<RawPage>, _>>()?,
        Value::Array(items) => vec![RawPage::with_results(items)],
        other => vec![serde_json::from_value(other)?],
    };

    Ok(ParsedDocument {
        pages,
        salvaged: false,
    })
}

fn is_page(value: &Value) -> bool {
    value.get("results").is_some_and(Value::is_array)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_flags_accept_strings_and_native_values() {
        let page: RawPage = serde_json::from_str(
            r#"{"totalrecords": "1200", "morerecords": "True", "results": []}"#,
        )
        .unwrap();
        assert!(page.has_more());
        assert_eq!(page.total_records(), Some(1200));

        let page: RawPage =
            serde_json::from_str(r#"{"totalrecords": 7, "morerecords": false}"#).unwrap();
        assert!(!page.has_more());
        assert_eq!(page.total_records(), Some(7));
    }

    #[test]
    fn parses_single_page() {
        let doc = parse_document(r#"{"results": [{"Feature name": "A"}], "morerecords": false}"#)
            .unwrap();
        assert!(!doc.salvaged);
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].results.len(), 1);
    }

    #[test]
    fn parses_concatenated_pages() {
        let doc = parse_document(
            r#"[{"results": [{"Feature name": "A"}], "morerecords": true},
                {"results": [{"Feature name": "B"}], "morerecords": false}]"#,
        )
        .unwrap();
        assert_eq!(doc.pages.len(), 2);
        assert!(doc.pages[0].has_more());
    }

    #[test]
    fn parses_bare_entry_array() {
        let doc = parse_document(r#"[{"Feature name": "A"}, {"Feature name": "B"}]"#).unwrap();
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].results.len(), 2);
    }

    #[test]
    fn salvages_broken_json() {
        let doc = parse_document(
            r#"{"totalrecords": "2", "results": [{"Feature name": "A",}, {"Feature name": "B"} "#,
        )
        .unwrap();
        assert!(doc.salvaged);
        assert_eq!(doc.pages[0].results.len(), 2);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_document("<html>Service Unavailable</html>").is_err());
    }
}
