use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::record::FeatureRecord;

/// Feed key used when a single feed is tracked.
pub const DEFAULT_FEED_KEY: &str = "all-release-plans";

/// An immutable point-in-time capture of every record in a feed.
///
/// Records keep feed order and are indexed by release-plan identifier.
/// Snapshots are superseded by the next refresh, never edited.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub feed_key: String,
    pub captured_at: DateTime<Utc>,
    records: Vec<FeatureRecord>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Snapshot {
    /// Build a snapshot. A repeated identifier keeps its first occurrence.
    pub fn new(
        feed_key: impl Into<String>,
        captured_at: DateTime<Utc>,
        records: Vec<FeatureRecord>,
    ) -> Self {
        let mut index = HashMap::with_capacity(records.len());
        let mut unique = Vec::with_capacity(records.len());

        for record in records {
            if index.contains_key(&record.release_plan_id) {
                continue;
            }
            index.insert(record.release_plan_id.clone(), unique.len());
            unique.push(record);
        }

        Self {
            feed_key: feed_key.into(),
            captured_at,
            records: unique,
            index,
        }
    }

    /// An empty snapshot, used as the baseline before the first refresh.
    pub fn empty(feed_key: impl Into<String>, captured_at: DateTime<Utc>) -> Self {
        Self::new(feed_key, captured_at, Vec::new())
    }

    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    pub fn get(&self, release_plan_id: &str) -> Option<&FeatureRecord> {
        self.index.get(release_plan_id).map(|&i| &self.records[i])
    }

    pub fn contains(&self, release_plan_id: &str) -> bool {
        self.index.contains_key(release_plan_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether at least one identifier appears in both snapshots.
    pub fn shares_identifiers_with(&self, other: &Snapshot) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .records
            .iter()
            .any(|r| large.contains(&r.release_plan_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_identifiers_keep_first_occurrence() {
        let snapshot = Snapshot::new(
            DEFAULT_FEED_KEY,
            Utc::now(),
            vec![
                FeatureRecord::new("RP-1", "Power Apps", "First"),
                FeatureRecord::new("RP-2", "Power Apps", "Second"),
                FeatureRecord::new("RP-1", "Power Apps", "Duplicate"),
            ],
        );

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("RP-1").unwrap().feature_name, "First");
        assert_eq!(snapshot.records()[1].release_plan_id, "RP-2");
    }

    #[test]
    fn overlap_detection() {
        let now = Utc::now();
        let a = Snapshot::new("k", now, vec![FeatureRecord::new("RP-1", "P", "A")]);
        let b = Snapshot::new(
            "k",
            now,
            vec![
                FeatureRecord::new("RP-2", "P", "B"),
                FeatureRecord::new("RP-1", "P", "A"),
            ],
        );
        let c = Snapshot::new("k", now, vec![FeatureRecord::new("RP-3", "P", "C")]);

        assert!(a.shares_identifiers_with(&b));
        assert!(b.shares_identifiers_with(&a));
        assert!(!a.shares_identifiers_with(&c));
        assert!(!a.shares_identifiers_with(&Snapshot::empty("k", now)));
    }
}
