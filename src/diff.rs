//! Change detection between two snapshots of the same feed.
//!
//! The differ is pure: identical inputs always produce identical events, and
//! persisting them is left to a [`SnapshotStore`](crate::store::SnapshotStore).
//! Identifiers that disappear from the feed are not reported.

use serde::Serialize;

use crate::models::{ChangeEvent, ChangeType, FeatureRecord, Snapshot, TrackedField};

/// Non-fatal conditions found while diffing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffWarning {
    /// Both snapshots have records but no identifier in common, which usually
    /// means they capture different feeds. No events are produced.
    SnapshotMismatch { previous: usize, current: usize },
}

/// Events and counts produced by [`diff_snapshots`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffReport {
    pub events: Vec<ChangeEvent>,
    pub new_features: usize,
    /// Records present in both snapshots with at least one changed field.
    pub changed_features: usize,
    pub warnings: Vec<DiffWarning>,
}

/// Compare `previous` against `current`.
///
/// Events follow the current snapshot's order, and within a record the
/// order of [`TrackedField::ALL`]. Every event is stamped with the current
/// snapshot's capture time.
pub fn diff_snapshots(previous: &Snapshot, current: &Snapshot) -> DiffReport {
    let mut report = DiffReport::default();

    if !previous.is_empty() && !current.is_empty() && !previous.shares_identifiers_with(current)
    {
        report.warnings.push(DiffWarning::SnapshotMismatch {
            previous: previous.len(),
            current: current.len(),
        });
        return report;
    }

    for record in current.records() {
        match previous.get(&record.release_plan_id) {
            None => {
                report.new_features += 1;
                report.events.push(new_feature_event(record, current));
            }
            Some(old) => {
                let before = report.events.len();
                report.events.extend(field_changes(old, record, current));
                if report.events.len() > before {
                    report.changed_features += 1;
                }
            }
        }
    }

    report
}

/// One event per tracked field whose value differs between `old` and `new`.
fn field_changes<'a>(
    old: &'a FeatureRecord,
    new: &'a FeatureRecord,
    current: &'a Snapshot,
) -> impl Iterator<Item = ChangeEvent> + 'a {
    TrackedField::ALL.into_iter().filter_map(move |field| {
        let old_value = field.value(old);
        let new_value = field.value(new);
        (old_value != new_value).then(|| ChangeEvent {
            release_plan_id: new.release_plan_id.clone(),
            field: Some(field),
            old_value,
            new_value,
            change_type: field.change_type(),
            detected_at: current.captured_at,
            feature_name: new.feature_name.clone(),
            product_name: new.product_name.clone(),
        })
    })
}

fn new_feature_event(record: &FeatureRecord, current: &Snapshot) -> ChangeEvent {
    ChangeEvent {
        release_plan_id: record.release_plan_id.clone(),
        field: None,
        old_value: None,
        new_value: None,
        change_type: ChangeType::NewFeature,
        detected_at: current.captured_at,
        feature_name: record.feature_name.clone(),
        product_name: record.product_name.clone(),
    }
}
