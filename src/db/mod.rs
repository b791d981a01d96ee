mod schema;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::filter::FilterConfig;
use crate::models::*;
use crate::store::SnapshotStore;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// Metadata of a stored snapshot, without its records.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SnapshotInfo {
    pub id: Uuid,
    pub feed_key: String,
    pub captured_at: DateTime<Utc>,
    pub record_count: u32,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "release-tracker")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("release-tracker.db"))
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Snapshot operations
    // ============================================================

    pub fn list_snapshots(&self, feed_key: &str, limit: u32) -> Result<Vec<SnapshotInfo>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, feed_key, captured_at, record_count
             FROM snapshots WHERE feed_key = ?
             ORDER BY captured_at DESC, rowid DESC LIMIT ?",
        )?;

        let snapshots = stmt
            .query_map((feed_key, limit), |row| {
                Ok(SnapshotInfo {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    feed_key: row.get(1)?,
                    captured_at: parse_datetime(row.get::<_, String>(2)?),
                    record_count: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(snapshots)
    }

    // ============================================================
    // Change log operations
    // ============================================================

    /// Changes detected at or after `since`, newest first.
    pub fn get_recent_changes(&self, since: DateTime<Utc>, limit: u32) -> Result<Vec<ChangeLogEntry>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, release_plan_id, feature_name, product_name, change_type, field,
                    old_value, new_value, detected_at
             FROM change_log WHERE detected_at >= ?
             ORDER BY detected_at DESC, rowid DESC LIMIT ?",
        )?;

        let entries = stmt
            .query_map((format_datetime(since), limit), row_to_change)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Full change history of one feature, newest first.
    pub fn get_feature_changes(&self, release_plan_id: &str) -> Result<Vec<ChangeLogEntry>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, release_plan_id, feature_name, product_name, change_type, field,
                    old_value, new_value, detected_at
             FROM change_log WHERE release_plan_id = ?
             ORDER BY detected_at DESC, rowid DESC",
        )?;

        let entries = stmt
            .query_map([release_plan_id], row_to_change)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    /// Identifiers with at least one change at or after `since`.
    pub fn get_changed_feature_ids(&self, since: DateTime<Utc>) -> Result<HashSet<String>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt =
            conn.prepare("SELECT DISTINCT release_plan_id FROM change_log WHERE detected_at >= ?")?;

        let ids = stmt
            .query_map([format_datetime(since)], |row| row.get(0))?
            .collect::<Result<HashSet<String>, _>>()?;

        Ok(ids)
    }

    /// Counts of changes detected since `since`, by category and type.
    pub fn get_change_summary(&self, since: DateTime<Utc>) -> Result<ChangeSummary> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let since_str = format_datetime(since);

        let mut stmt = conn.prepare(
            "SELECT change_type, COUNT(*) FROM change_log
             WHERE detected_at >= ? GROUP BY change_type",
        )?;
        let counts = stmt
            .query_map([&since_str], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let features: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT release_plan_id) FROM change_log WHERE detected_at >= ?",
            [&since_str],
            |row| row.get(0),
        )?;

        let mut summary = ChangeSummary::empty(since);
        summary.features = features as usize;
        for (change_type, count) in counts {
            match ChangeType::from_str(&change_type) {
                Some(t) => summary.add(t, count as usize),
                None => tracing::warn!("Unknown change type in change log: {}", change_type),
            }
        }

        Ok(summary)
    }

    // ============================================================
    // Watchlist operations
    // ============================================================

    pub fn get_watchlist(&self, user: &str) -> Result<Vec<WatchlistEntry>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT user, release_plan_id, feature_name, product_name, added_at
             FROM watchlist WHERE user = ? ORDER BY added_at DESC, rowid DESC",
        )?;

        let entries = stmt
            .query_map([user], |row| {
                Ok(WatchlistEntry {
                    user: row.get(0)?,
                    release_plan_id: row.get(1)?,
                    feature_name: row.get(2)?,
                    product_name: row.get(3)?,
                    added_at: parse_datetime(row.get::<_, String>(4)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    pub fn get_watchlist_ids(&self, user: &str) -> Result<HashSet<String>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare("SELECT release_plan_id FROM watchlist WHERE user = ?")?;

        let ids = stmt
            .query_map([user], |row| row.get(0))?
            .collect::<Result<HashSet<String>, _>>()?;

        Ok(ids)
    }

    /// Add a feature to a user's watchlist. Re-adding refreshes the names.
    pub fn add_to_watchlist(
        &self,
        user: &str,
        release_plan_id: &str,
        input: AddWatchlistInput,
    ) -> Result<WatchlistEntry> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();

        conn.execute(
            "INSERT INTO watchlist (user, release_plan_id, feature_name, product_name, added_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (user, release_plan_id)
             DO UPDATE SET feature_name = excluded.feature_name, product_name = excluded.product_name",
            (
                user,
                release_plan_id,
                &input.feature_name,
                &input.product_name,
                format_datetime(now),
            ),
        )?;

        let added_at: String = conn.query_row(
            "SELECT added_at FROM watchlist WHERE user = ? AND release_plan_id = ?",
            (user, release_plan_id),
            |row| row.get(0),
        )?;

        Ok(WatchlistEntry {
            user: user.to_string(),
            release_plan_id: release_plan_id.to_string(),
            feature_name: input.feature_name,
            product_name: input.product_name,
            added_at: parse_datetime(added_at),
        })
    }

    pub fn remove_from_watchlist(&self, user: &str, release_plan_id: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM watchlist WHERE user = ? AND release_plan_id = ?",
            (user, release_plan_id),
        )?;
        Ok(rows > 0)
    }

    // ============================================================
    // Note operations
    // ============================================================

    pub fn get_notes(&self, release_plan_id: &str) -> Result<Vec<Note>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, release_plan_id, author, content, created_at, updated_at
             FROM notes WHERE release_plan_id = ? ORDER BY created_at DESC, rowid DESC",
        )?;

        let notes = stmt
            .query_map([release_plan_id], row_to_note)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(notes)
    }

    pub fn get_note(&self, id: Uuid) -> Result<Option<Note>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let note = conn
            .query_row(
                "SELECT id, release_plan_id, author, content, created_at, updated_at
                 FROM notes WHERE id = ?",
                [id.to_string()],
                row_to_note,
            )
            .optional()?;
        Ok(note)
    }

    pub fn add_note(&self, release_plan_id: &str, input: CreateNoteInput) -> Result<Note> {
        if input.content.trim().is_empty() {
            anyhow::bail!("Note content must not be empty");
        }

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO notes (id, release_plan_id, author, content, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                release_plan_id,
                &input.author,
                &input.content,
                format_datetime(now),
                format_datetime(now),
            ),
        )?;

        Ok(Note {
            id,
            release_plan_id: release_plan_id.to_string(),
            author: input.author,
            content: input.content,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_note(&self, id: Uuid, input: UpdateNoteInput) -> Result<Option<Note>> {
        if input.content.trim().is_empty() {
            anyhow::bail!("Note content must not be empty");
        }
        let Some(existing) = self.get_note(id)? else {
            return Ok(None);
        };

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();

        conn.execute(
            "UPDATE notes SET content = ?, updated_at = ? WHERE id = ?",
            (&input.content, format_datetime(now), id.to_string()),
        )?;

        Ok(Some(Note {
            content: input.content,
            updated_at: now,
            ..existing
        }))
    }

    pub fn delete_note(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM notes WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    // ============================================================
    // Saved view operations
    // ============================================================

    /// Views owned by `user` plus every shared view, ordered by name.
    pub fn get_saved_views(&self, user: &str) -> Result<Vec<SavedView>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, owner, name, description, config, is_shared, created_at
             FROM saved_views WHERE owner = ? OR is_shared = 1 ORDER BY name, created_at",
        )?;

        let views = stmt
            .query_map([user], row_to_view)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(views)
    }

    pub fn get_saved_view(&self, id: Uuid) -> Result<Option<SavedView>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let view = conn
            .query_row(
                "SELECT id, owner, name, description, config, is_shared, created_at
                 FROM saved_views WHERE id = ?",
                [id.to_string()],
                row_to_view,
            )
            .optional()?;
        Ok(view)
    }

    pub fn save_view(&self, input: CreateSavedViewInput) -> Result<SavedView> {
        if input.name.trim().is_empty() {
            anyhow::bail!("View name must not be empty");
        }

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();
        let config_json = serde_json::to_string(&input.config)?;

        conn.execute(
            "INSERT INTO saved_views (id, owner, name, description, config, is_shared, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &input.owner,
                &input.name,
                &input.description,
                &config_json,
                if input.is_shared { 1 } else { 0 },
                format_datetime(now),
            ),
        )?;

        Ok(SavedView {
            id,
            owner: input.owner,
            name: input.name,
            description: input.description,
            config: input.config,
            is_shared: input.is_shared,
            created_at: now,
        })
    }

    pub fn delete_saved_view(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM saved_views WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    // ============================================================
    // Refresh log operations
    // ============================================================

    pub fn start_refresh_log(&self) -> Result<RefreshLog> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO refresh_log (id, started_at, status) VALUES (?, ?, ?)",
            (
                id.to_string(),
                format_datetime(now),
                RefreshStatus::Running.as_str(),
            ),
        )?;

        Ok(RefreshLog {
            id,
            started_at: now,
            completed_at: None,
            status: RefreshStatus::Running,
            source: None,
            total_features: 0,
            new_features: 0,
            changed_features: 0,
            skipped_entries: 0,
            error_message: None,
        })
    }

    pub fn complete_refresh_log(
        &self,
        id: Uuid,
        status: RefreshStatus,
        input: CompleteRefreshInput,
    ) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE refresh_log SET completed_at = ?, status = ?, source = ?, total_features = ?,
                    new_features = ?, changed_features = ?, skipped_entries = ?, error_message = ?
             WHERE id = ?",
            (
                format_datetime(Utc::now()),
                status.as_str(),
                input.source.map(|s| s.as_str()),
                input.total_features,
                input.new_features,
                input.changed_features,
                input.skipped_entries,
                &input.error_message,
                id.to_string(),
            ),
        )?;
        Ok(rows > 0)
    }

    /// Most recent refresh runs first.
    pub fn get_refresh_logs(&self, limit: u32) -> Result<Vec<RefreshLog>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, started_at, completed_at, status, source, total_features, new_features,
                    changed_features, skipped_entries, error_message
             FROM refresh_log ORDER BY started_at DESC, rowid DESC LIMIT ?",
        )?;

        let logs = stmt
            .query_map([limit], |row| {
                Ok(RefreshLog {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    started_at: parse_datetime(row.get::<_, String>(1)?),
                    completed_at: row.get::<_, Option<String>>(2)?.map(parse_datetime),
                    status: RefreshStatus::from_str(&row.get::<_, String>(3)?)
                        .unwrap_or(RefreshStatus::Failed),
                    source: row
                        .get::<_, Option<String>>(4)?
                        .and_then(|s| FeedSource::from_str(&s)),
                    total_features: row.get(5)?,
                    new_features: row.get(6)?,
                    changed_features: row.get(7)?,
                    skipped_entries: row.get(8)?,
                    error_message: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(logs)
    }
}

impl SnapshotStore for Database {
    fn load_latest_snapshot(&self, feed_key: &str) -> Result<Option<Snapshot>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let row = conn
            .query_row(
                "SELECT captured_at, records FROM snapshots WHERE feed_key = ?
                 ORDER BY captured_at DESC, rowid DESC LIMIT 1",
                [feed_key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((captured_at, records_json)) = row else {
            return Ok(None);
        };

        let records: Vec<FeatureRecord> = serde_json::from_str(&records_json)
            .with_context(|| format!("Corrupt snapshot records for feed {}", feed_key))?;

        Ok(Some(Snapshot::new(
            feed_key,
            parse_datetime(captured_at),
            records,
        )))
    }

    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        insert_snapshot(&conn, snapshot)
    }

    fn append_change_events(&self, events: &[ChangeEvent]) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        insert_change_events(&tx, events)?;
        tx.commit()?;
        Ok(())
    }

    fn commit_snapshot(&self, snapshot: &Snapshot, events: &[ChangeEvent]) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        insert_change_events(&tx, events)?;
        insert_snapshot(&tx, snapshot)?;
        tx.commit()?;
        Ok(())
    }
}

fn insert_snapshot(conn: &Connection, snapshot: &Snapshot) -> Result<()> {
    let records_json = serde_json::to_string(snapshot.records())?;
    conn.execute(
        "INSERT INTO snapshots (id, feed_key, captured_at, record_count, records)
         VALUES (?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &snapshot.feed_key,
            format_datetime(snapshot.captured_at),
            snapshot.len() as u32,
            &records_json,
        ),
    )?;
    Ok(())
}

fn insert_change_events(conn: &Connection, events: &[ChangeEvent]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO change_log (id, release_plan_id, feature_name, product_name, change_type,
                                 category, field, old_value, new_value, detected_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    for event in events {
        stmt.execute((
            Uuid::new_v4().to_string(),
            &event.release_plan_id,
            &event.feature_name,
            &event.product_name,
            event.change_type.as_str(),
            event.change_type.category().as_str(),
            event.field.map(|f| f.as_str()),
            &event.old_value,
            &event.new_value,
            format_datetime(event.detected_at),
        ))?;
    }
    Ok(())
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn row_to_change(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangeLogEntry> {
    let change_type =
        ChangeType::from_str(&row.get::<_, String>(4)?).unwrap_or(ChangeType::NewFeature);
    Ok(ChangeLogEntry {
        id: parse_uuid(row.get::<_, String>(0)?),
        event: ChangeEvent {
            release_plan_id: row.get(1)?,
            feature_name: row.get(2)?,
            product_name: row.get(3)?,
            change_type,
            field: row
                .get::<_, Option<String>>(5)?
                .and_then(|f| TrackedField::from_str(&f)),
            old_value: row.get(6)?,
            new_value: row.get(7)?,
            detected_at: parse_datetime(row.get::<_, String>(8)?),
        },
        category: change_type.category(),
    })
}

fn row_to_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: parse_uuid(row.get::<_, String>(0)?),
        release_plan_id: row.get(1)?,
        author: row.get(2)?,
        content: row.get(3)?,
        created_at: parse_datetime(row.get::<_, String>(4)?),
        updated_at: parse_datetime(row.get::<_, String>(5)?),
    })
}

fn row_to_view(row: &rusqlite::Row<'_>) -> rusqlite::Result<SavedView> {
    let config_json: String = row.get(4)?;
    let config: FilterConfig = serde_json::from_str(&config_json).unwrap_or_default();
    Ok(SavedView {
        id: parse_uuid(row.get::<_, String>(0)?),
        owner: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        config,
        is_shared: row.get::<_, i32>(5)? != 0,
        created_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

/// Fixed-width UTC timestamps so lexical order in SQL matches time order.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
