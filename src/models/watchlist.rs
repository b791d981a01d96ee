use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A feature a team member follows.
///
/// Unique per `(user, release_plan_id)`; adding the same feature twice
/// refreshes the stored names instead of creating a second entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub user: String,
    pub release_plan_id: String,
    pub feature_name: String,
    pub product_name: String,
    pub added_at: DateTime<Utc>,
}

/// Input for adding a feature to a watchlist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddWatchlistInput {
    pub feature_name: String,
    pub product_name: String,
}
