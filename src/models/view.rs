use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filter::FilterConfig;

/// A named filter configuration.
///
/// Private views are visible only to their owner; shared views are visible
/// to everyone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedView {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub config: FilterConfig,
    pub is_shared: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for saving a view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSavedViewInput {
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub config: FilterConfig,
    #[serde(default)]
    pub is_shared: bool,
}
