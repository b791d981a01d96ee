//! The refresh pipeline: fetch, snapshot, diff, persist, log.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::Database;
use crate::diff::{diff_snapshots, DiffReport, DiffWarning};
use crate::feed::{FeedService, LoadedFeed};
use crate::models::{
    CompleteRefreshInput, FeatureRecord, FeedSource, RefreshStatus, Snapshot,
};
use crate::store::SnapshotStore;

/// Outcome of one successful refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub refresh_id: uuid::Uuid,
    pub source: FeedSource,
    pub captured_at: DateTime<Utc>,
    pub total_features: usize,
    pub new_features: usize,
    pub changed_features: usize,
    pub skipped_entries: usize,
    pub events: usize,
    pub warnings: Vec<DiffWarning>,
}

/// Capture `records` as a new snapshot, diff it against the latest stored
/// one and persist both the snapshot and the resulting events.
pub fn record_snapshot<S: SnapshotStore + ?Sized>(
    store: &S,
    feed_key: &str,
    captured_at: DateTime<Utc>,
    records: Vec<FeatureRecord>,
) -> Result<DiffReport> {
    let current = Snapshot::new(feed_key, captured_at, records);
    let previous = store
        .load_latest_snapshot(feed_key)
        .context("Failed to load previous snapshot")?
        .unwrap_or_else(|| Snapshot::empty(feed_key, captured_at));

    let report = diff_snapshots(&previous, &current);
    for warning in &report.warnings {
        match warning {
            DiffWarning::SnapshotMismatch { previous, current } => tracing::warn!(
                "Snapshot mismatch for {}: {} previous and {} current records share no identifier",
                feed_key,
                previous,
                current
            ),
        }
    }

    store
        .commit_snapshot(&current, &report.events)
        .context("Failed to save snapshot and change events")?;

    Ok(report)
}

/// Reload the feed, bypassing the cache, and record what changed.
///
/// Every run leaves a refresh log entry, marked failed when the feed could
/// not be loaded or persisting failed.
pub async fn run_refresh(feed: &FeedService, db: &Database) -> Result<RefreshSummary> {
    let log = db.start_refresh_log()?;
    tracing::info!("Refresh {} started for feed {}", log.id, feed.feed_key());

    let result = match feed.reload().await {
        Ok(loaded) => persist(db, feed.feed_key(), &loaded).map(|report| (loaded, report)),
        Err(e) => Err(anyhow::Error::new(e)),
    };

    match result {
        Ok((loaded, report)) => {
            let summary = RefreshSummary {
                refresh_id: log.id,
                source: loaded.source,
                captured_at: loaded.fetched_at,
                total_features: loaded.records.len(),
                new_features: report.new_features,
                changed_features: report.changed_features,
                skipped_entries: loaded.skipped,
                events: report.events.len(),
                warnings: report.warnings,
            };
            db.complete_refresh_log(
                log.id,
                RefreshStatus::Completed,
                CompleteRefreshInput {
                    source: Some(summary.source),
                    total_features: summary.total_features as u32,
                    new_features: summary.new_features as u32,
                    changed_features: summary.changed_features as u32,
                    skipped_entries: summary.skipped_entries as u32,
                    error_message: None,
                },
            )?;
            tracing::info!(
                "Refresh {} completed: {} features ({} new, {} changed, {} skipped) from {}",
                log.id,
                summary.total_features,
                summary.new_features,
                summary.changed_features,
                summary.skipped_entries,
                summary.source.as_str()
            );
            Ok(summary)
        }
        Err(e) => {
            tracing::error!("Refresh {} failed: {:#}", log.id, e);
            db.complete_refresh_log(
                log.id,
                RefreshStatus::Failed,
                CompleteRefreshInput {
                    error_message: Some(format!("{:#}", e)),
                    ..Default::default()
                },
            )?;
            Err(e)
        }
    }
}

fn persist(db: &Database, feed_key: &str, loaded: &LoadedFeed) -> Result<DiffReport> {
    record_snapshot(
        db,
        feed_key,
        loaded.fetched_at,
        loaded.records.as_ref().clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeType;
    use chrono::{Duration, NaiveDate};
    use std::cell::{Cell, RefCell};

    /// In-memory store that records every call.
    #[derive(Default)]
    struct MemoryStore {
        snapshots: RefCell<Vec<Snapshot>>,
        events: RefCell<Vec<crate::models::ChangeEvent>>,
        fail_next_append: Cell<bool>,
    }

    impl SnapshotStore for MemoryStore {
        fn load_latest_snapshot(&self, feed_key: &str) -> Result<Option<Snapshot>> {
            Ok(self
                .snapshots
                .borrow()
                .iter()
                .rev()
                .find(|s| s.feed_key == feed_key)
                .map(|s| Snapshot::new(s.feed_key.clone(), s.captured_at, s.records().to_vec())))
        }

        fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
            self.snapshots.borrow_mut().push(Snapshot::new(
                snapshot.feed_key.clone(),
                snapshot.captured_at,
                snapshot.records().to_vec(),
            ));
            Ok(())
        }

        fn append_change_events(&self, events: &[crate::models::ChangeEvent]) -> Result<()> {
            if self.fail_next_append.replace(false) {
                anyhow::bail!("disk full");
            }
            self.events.borrow_mut().extend_from_slice(events);
            Ok(())
        }
    }

    #[test]
    fn first_snapshot_records_every_feature_as_new() {
        let store = MemoryStore::default();
        let records = vec![
            FeatureRecord::new("RP-1", "Power Apps", "Forms"),
            FeatureRecord::new("RP-2", "Power Apps", "Themes"),
        ];

        let report = record_snapshot(&store, "feed", Utc::now(), records).unwrap();

        assert_eq!(report.new_features, 2);
        assert_eq!(store.snapshots.borrow().len(), 1);
        assert_eq!(store.events.borrow().len(), 2);
    }

    #[test]
    fn second_snapshot_records_only_differences() {
        let store = MemoryStore::default();
        let t0 = Utc::now();
        let record = FeatureRecord::new("RP-1", "Power Apps", "Forms");
        record_snapshot(&store, "feed", t0, vec![record.clone()]).unwrap();

        let mut changed = record;
        changed.ga_date = NaiveDate::from_ymd_opt(2025, 3, 1);
        let report =
            record_snapshot(&store, "feed", t0 + Duration::hours(1), vec![changed]).unwrap();

        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].change_type, ChangeType::GaDateChanged);
        assert_eq!(store.snapshots.borrow().len(), 2);
        assert_eq!(store.events.borrow().len(), 2);
    }

    #[test]
    fn feeds_are_diffed_independently() {
        let store = MemoryStore::default();
        let now = Utc::now();
        record_snapshot(&store, "a", now, vec![FeatureRecord::new("RP-1", "P", "F")]).unwrap();

        let report =
            record_snapshot(&store, "b", now, vec![FeatureRecord::new("RP-9", "P", "G")]).unwrap();

        assert!(report.warnings.is_empty());
        assert_eq!(report.new_features, 1);
    }

    #[test]
    fn failed_event_write_keeps_the_previous_baseline() {
        let store = MemoryStore::default();
        let t0 = Utc::now();
        let record = FeatureRecord::new("RP-1", "Power Apps", "Forms");
        record_snapshot(&store, "feed", t0, vec![record.clone()]).unwrap();

        let mut changed = record;
        changed.ga_date = NaiveDate::from_ymd_opt(2025, 3, 1);
        store.fail_next_append.set(true);
        let err = record_snapshot(
            &store,
            "feed",
            t0 + Duration::hours(1),
            vec![changed.clone()],
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("disk full"));
        assert_eq!(store.snapshots.borrow().len(), 1);

        let report =
            record_snapshot(&store, "feed", t0 + Duration::hours(2), vec![changed]).unwrap();

        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].change_type, ChangeType::GaDateChanged);
        let persisted = store.events.borrow();
        assert_eq!(
            persisted
                .iter()
                .filter(|e| e.change_type == ChangeType::GaDateChanged)
                .count(),
            1
        );
    }
}
