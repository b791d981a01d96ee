use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A team note attached to a release-plan feature.
///
/// Notes are keyed by release-plan identifier rather than by snapshot, so
/// they survive every refresh of the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub release_plan_id: String,
    /// Who wrote the note.
    pub author: String,
    /// The note content (markdown supported).
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNoteInput {
    pub author: String,
    pub content: String,
}

/// Input for editing a note's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNoteInput {
    pub content: String,
}
