//! Best-effort recovery of entries from a feed body that is not valid JSON.
//!
//! The feed occasionally serves truncated or hand-edited documents. Rather
//! than lose the whole page, each top-level object inside the `results`
//! array is cut out with a string-aware brace scanner and parsed on its own.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));

static RESULTS_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""results"\s*:\s*\["#).expect("valid regex"));

/// Extract every parseable object from the `results` array of `text`.
///
/// Returns `None` when there is no `results` array or nothing in it parses.
pub(crate) fn salvage_results(text: &str) -> Option<Vec<Value>> {
    let start = RESULTS_START.find(text)?.end();
    let objects: Vec<Value> = scan_objects(&text[start..])
        .into_iter()
        .filter_map(|raw| {
            let repaired = TRAILING_COMMA.replace_all(raw, "$1");
            serde_json::from_str::<Value>(&repaired).ok()
        })
        .filter(Value::is_object)
        .collect();

    if objects.is_empty() {
        None
    } else {
        Some(objects)
    }
}

/// Slice out balanced top-level `{...}` spans until the enclosing array closes.
fn scan_objects(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        spans.push(&text[s..=i]);
                    }
                }
            }
            ']' if depth == 0 => break,
            _ => {}
        }
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanner_ignores_braces_inside_strings() {
        let spans = scan_objects(r#"{"a": "}{"}, {"b": "\"}"}]"#);
        assert_eq!(spans, vec![r#"{"a": "}{"}"#, r#"{"b": "\"}"}"#]);
    }

    #[test]
    fn scanner_stops_at_array_end() {
        let spans = scan_objects(r#"{"a": 1}], "other": [{"b": 2}]"#);
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn unterminated_trailing_object_is_dropped() {
        let values =
            salvage_results(r#"{"results": [{"Feature name": "A"}, {"Feature name": "B"#).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["Feature name"], "A");
    }

    #[test]
    fn nested_objects_stay_whole() {
        let values = salvage_results(r#"{"results": [{"x": {"y": [1, 2,]},}]"#).unwrap();
        assert_eq!(values[0]["x"]["y"][1], 2);
    }

    #[test]
    fn missing_results_is_none() {
        assert!(salvage_results(r#"{"items": [{"a": 1}]}"#).is_none());
    }
}
