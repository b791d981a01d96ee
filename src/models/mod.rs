//! Domain models for the release tracker.
//!
//! # Core Concepts
//!
//! ## Feed Entities
//!
//! These are rebuilt from the feed on every refresh:
//!
//! - [`FeatureRecord`]: One release-plan entry, with typed optional fields.
//! - [`ReleaseStatus`]: Lifecycle stage derived from the milestone dates. Never stored.
//! - [`Snapshot`]: Immutable capture of all records at a point in time.
//! - [`ChangeEvent`]: One difference between two successive snapshots.
//!
//! ## Team Entities
//!
//! These are persisted and outlive any snapshot:
//!
//! - [`WatchlistEntry`]: A feature a team member follows.
//! - [`Note`]: Free-form notes attached to a feature.
//! - [`SavedView`]: A named filter configuration, private or shared.
//! - [`RefreshLog`]: Audit trail of refresh runs.

mod change;
mod note;
mod record;
mod refresh;
mod snapshot;
mod status;
mod view;
mod watchlist;

pub use change::*;
pub use note::*;
pub use record::*;
pub use refresh::*;
pub use snapshot::*;
pub use status::*;
pub use view::*;
pub use watchlist::*;
