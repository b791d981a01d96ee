//! Persistence seam for snapshots and change events.
//!
//! The refresh pipeline depends only on these operations, never on the
//! storage technology behind them.

use anyhow::Result;

use crate::models::{ChangeEvent, Snapshot};

pub trait SnapshotStore {
    /// The most recently saved snapshot for `feed_key`, if any.
    fn load_latest_snapshot(&self, feed_key: &str) -> Result<Option<Snapshot>>;

    /// Persist a snapshot. Earlier snapshots are kept, not replaced.
    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// Append events to the change log. Existing events are never modified.
    fn append_change_events(&self, events: &[ChangeEvent]) -> Result<()>;

    /// Persist a snapshot together with the events diffed from it.
    ///
    /// The snapshot becomes the next diff baseline, so it must never land
    /// without its events. Stores with transactions should override this to
    /// write both atomically; the default appends the events first so a
    /// failure leaves the previous baseline in place.
    fn commit_snapshot(&self, snapshot: &Snapshot, events: &[ChangeEvent]) -> Result<()> {
        self.append_change_events(events)?;
        self.save_snapshot(snapshot)
    }
}
