use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The outcome of a refresh run.
///
/// - `Running`: started, not yet finished
/// - `Completed`: snapshot saved and changes recorded
/// - `Failed`: no data could be loaded, or persisting failed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Running,
    Completed,
    Failed,
}

impl RefreshStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Where the records of a refresh came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    /// Fetched from the live feed.
    Network,
    /// Loaded from the local fallback file after the feed failed.
    Fallback,
    /// Reused from the in-memory cache.
    Cache,
}

impl FeedSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Fallback => "fallback",
            Self::Cache => "cache",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "network" => Some(Self::Network),
            "fallback" => Some(Self::Fallback),
            "cache" => Some(Self::Cache),
            _ => None,
        }
    }
}

/// One row of the refresh log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshLog {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RefreshStatus,
    pub source: Option<FeedSource>,
    pub total_features: u32,
    pub new_features: u32,
    pub changed_features: u32,
    pub skipped_entries: u32,
    pub error_message: Option<String>,
}

/// Counts recorded when a refresh finishes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteRefreshInput {
    pub source: Option<FeedSource>,
    pub total_features: u32,
    pub new_features: u32,
    pub changed_features: u32,
    pub skipped_entries: u32,
    pub error_message: Option<String>,
}
