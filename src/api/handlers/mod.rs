use std::collections::{BTreeSet, HashSet};

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::db::{Database, SnapshotInfo};
use crate::export::{summarize, to_csv_string, Summary};
use crate::feed::{FeedError, FeedService, LoadedFeed};
use crate::filter::{filter_records, DateRange, FilterConfig, SortOrder};
use crate::models::*;
use crate::refresh::{run_refresh, RefreshSummary};

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
///
/// Validation errors raised by the database layer are safe to expose and
/// come back as BAD_REQUEST; everything else is logged and hidden.
fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    let msg = e.to_string();

    if msg.contains("must not be empty") {
        tracing::warn!("Validation error: {}", msg);
        return (StatusCode::BAD_REQUEST, msg);
    }

    tracing::error!("Internal error: {}", msg);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

fn feed_unavailable(e: FeedError) -> (StatusCode, String) {
    tracing::warn!("Feed unavailable: {}", e);
    (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
}

fn bad_request(msg: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg.into())
}

/// Start of a `days`-long look-back window named by query parameter `param`.
fn since(days: i64, param: &str) -> Result<DateTime<Utc>, (StatusCode, String)> {
    if days < 0 {
        return Err(bad_request(format!("{} must not be negative", param)));
    }
    window_start(Utc::now(), days)
        .ok_or_else(|| bad_request(format!("{} is out of range", param)))
}

async fn load_feed(feed: &FeedService) -> Result<LoadedFeed, (StatusCode, String)> {
    feed.load().await.map_err(feed_unavailable)
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Features
// ============================================================

/// Query parameters for feature listings. Multi-value filters are
/// comma-separated.
#[derive(Debug, Default, Deserialize)]
pub struct FeatureQuery {
    pub products: Option<String>,
    pub statuses: Option<String>,
    pub waves: Option<String>,
    pub investment_areas: Option<String>,
    pub enabled_for: Option<String>,
    pub ga_from: Option<NaiveDate>,
    pub ga_to: Option<NaiveDate>,
    pub q: Option<String>,
    /// `ga_date`, `last_updated`, `product_name` or `feature_name`; prefix `-` for descending.
    pub sort: Option<String>,
    /// Only features on this user's watchlist.
    pub watched_by: Option<String>,
    /// Only features with a recorded change in the last N days.
    pub changed_within_days: Option<i64>,
    /// Evaluate statuses as of this date instead of today.
    pub as_of: Option<NaiveDate>,
}

impl FeatureQuery {
    fn today(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }

    fn filter_config(&self) -> Result<FilterConfig, (StatusCode, String)> {
        let statuses = split_list(self.statuses.as_deref())
            .into_iter()
            .map(|s| {
                ReleaseStatus::from_str(&s)
                    .ok_or_else(|| bad_request(format!("Unknown status: {}", s)))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        let sort = match self.sort.as_deref() {
            Some(s) => Some(
                SortOrder::parse(s)
                    .ok_or_else(|| bad_request(format!("Unknown sort key: {}", s)))?,
            ),
            None => None,
        };

        let ga_range = DateRange {
            start: self.ga_from,
            end: self.ga_to,
        };

        Ok(FilterConfig {
            products: split_list(self.products.as_deref()),
            statuses,
            waves: split_list(self.waves.as_deref()),
            investment_areas: split_list(self.investment_areas.as_deref()),
            enabled_for: split_list(self.enabled_for.as_deref()),
            ga_range: ga_range.is_active().then_some(ga_range),
            search: self.q.clone(),
            sort,
        })
    }
}

fn split_list(raw: Option<&str>) -> BTreeSet<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Identifiers the listing is restricted to by the watchlist and
/// recent-change parameters, or `None` when neither is set.
fn restriction(
    db: &Database,
    query: &FeatureQuery,
) -> Result<Option<HashSet<String>>, (StatusCode, String)> {
    let mut allowed: Option<HashSet<String>> = None;

    if let Some(user) = &query.watched_by {
        allowed = Some(db.get_watchlist_ids(user).map_err(internal_error)?);
    }

    if let Some(days) = query.changed_within_days {
        let changed = db
            .get_changed_feature_ids(since(days, "changed_within_days")?)
            .map_err(internal_error)?;
        allowed = Some(match allowed {
            Some(ids) => ids.intersection(&changed).cloned().collect(),
            None => changed,
        });
    }

    Ok(allowed)
}

async fn select_features(
    state: &AppState,
    config: &FilterConfig,
    query: &FeatureQuery,
) -> Result<Vec<FeatureRecord>, (StatusCode, String)> {
    let allowed = restriction(&state.db, query)?;
    let feed = load_feed(&state.feed).await?;

    Ok(filter_records(&feed.records, config, query.today())
        .into_iter()
        .filter(|r| {
            allowed
                .as_ref()
                .is_none_or(|ids| ids.contains(&r.release_plan_id))
        })
        .cloned()
        .collect())
}

pub async fn list_features(
    State(state): State<AppState>,
    Query(query): Query<FeatureQuery>,
) -> Result<Json<Vec<FeatureView>>, (StatusCode, String)> {
    let config = query.filter_config()?;
    let today = query.today();
    let records = select_features(&state, &config, &query).await?;
    Ok(Json(records.iter().map(|r| r.view(today)).collect()))
}

pub async fn get_feature(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<FeatureQuery>,
) -> Result<Json<FeatureView>, (StatusCode, String)> {
    let loaded = load_feed(&state.feed).await?;
    loaded
        .records
        .iter()
        .find(|r| r.release_plan_id == id)
        .map(|r| Json(r.view(query.today())))
        .ok_or((StatusCode::NOT_FOUND, "Feature not found".to_string()))
}

pub async fn export_features(
    State(state): State<AppState>,
    Query(query): Query<FeatureQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let config = query.filter_config()?;
    let records = select_features(&state, &config, &query).await?;
    let body = to_csv_string(&records, query.today()).map_err(internal_error)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"release-plans.csv\"",
            ),
        ],
        body,
    ))
}

pub async fn feature_summary(
    State(state): State<AppState>,
    Query(query): Query<FeatureQuery>,
) -> Result<Json<Summary>, (StatusCode, String)> {
    let config = query.filter_config()?;
    let records = select_features(&state, &config, &query).await?;
    Ok(Json(summarize(&records, query.today())))
}

// ============================================================
// Refresh
// ============================================================

pub async fn refresh(
    State(state): State<AppState>,
) -> Result<Json<RefreshSummary>, (StatusCode, String)> {
    run_refresh(&state.feed, &state.db).await.map(Json).map_err(|e| {
        match e.downcast::<FeedError>() {
            Ok(feed_err) => feed_unavailable(feed_err),
            Err(other) => internal_error(format!("{:#}", other)),
        }
    })
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

pub async fn list_refreshes(
    State(db): State<Database>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<RefreshLog>>, (StatusCode, String)> {
    db.get_refresh_logs(query.limit.unwrap_or(20))
        .map(Json)
        .map_err(internal_error)
}

// ============================================================
// Snapshots
// ============================================================

pub async fn list_snapshots(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<SnapshotInfo>>, (StatusCode, String)> {
    state
        .db
        .list_snapshots(state.feed.feed_key(), query.limit.unwrap_or(20))
        .map(Json)
        .map_err(internal_error)
}

// ============================================================
// Change Log
// ============================================================

#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    pub days: Option<i64>,
    pub limit: Option<u32>,
}

pub async fn recent_changes(
    State(db): State<Database>,
    Query(query): Query<ChangesQuery>,
) -> Result<Json<Vec<ChangeLogEntry>>, (StatusCode, String)> {
    let cutoff = since(query.days.unwrap_or(7), "days")?;
    db.get_recent_changes(cutoff, query.limit.unwrap_or(100))
        .map(Json)
        .map_err(internal_error)
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub days: Option<i64>,
}

pub async fn change_summary(
    State(db): State<Database>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<ChangeSummary>, (StatusCode, String)> {
    let cutoff = since(query.days.unwrap_or(7), "days")?;
    db.get_change_summary(cutoff)
        .map(Json)
        .map_err(internal_error)
}

pub async fn get_feature_changes(
    State(db): State<Database>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ChangeLogEntry>>, (StatusCode, String)> {
    db.get_feature_changes(&id).map(Json).map_err(internal_error)
}

// ============================================================
// Notes
// ============================================================

pub async fn list_notes(
    State(db): State<Database>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Note>>, (StatusCode, String)> {
    db.get_notes(&id).map(Json).map_err(internal_error)
}

pub async fn create_note(
    State(db): State<Database>,
    Path(id): Path<String>,
    Json(input): Json<CreateNoteInput>,
) -> Result<(StatusCode, Json<Note>), (StatusCode, String)> {
    db.add_note(&id, input)
        .map(|n| (StatusCode::CREATED, Json(n)))
        .map_err(internal_error)
}

pub async fn update_note(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateNoteInput>,
) -> Result<Json<Note>, (StatusCode, String)> {
    db.update_note(id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Note not found".to_string()))
}

pub async fn delete_note(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if db.delete_note(id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Note not found".to_string()))
    }
}

// ============================================================
// Watchlists
// ============================================================

pub async fn get_watchlist(
    State(db): State<Database>,
    Path(user): Path<String>,
) -> Result<Json<Vec<WatchlistEntry>>, (StatusCode, String)> {
    db.get_watchlist(&user).map(Json).map_err(internal_error)
}

pub async fn add_to_watchlist(
    State(db): State<Database>,
    Path((user, id)): Path<(String, String)>,
    Json(input): Json<AddWatchlistInput>,
) -> Result<Json<WatchlistEntry>, (StatusCode, String)> {
    db.add_to_watchlist(&user, &id, input)
        .map(Json)
        .map_err(internal_error)
}

pub async fn remove_from_watchlist(
    State(db): State<Database>,
    Path((user, id)): Path<(String, String)>,
) -> Result<StatusCode, (StatusCode, String)> {
    if db.remove_from_watchlist(&user, &id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Watchlist entry not found".to_string()))
    }
}

// ============================================================
// Saved Views
// ============================================================

#[derive(Debug, Deserialize)]
pub struct ViewsQuery {
    pub user: String,
}

pub async fn list_views(
    State(db): State<Database>,
    Query(query): Query<ViewsQuery>,
) -> Result<Json<Vec<SavedView>>, (StatusCode, String)> {
    db.get_saved_views(&query.user)
        .map(Json)
        .map_err(internal_error)
}

pub async fn create_view(
    State(db): State<Database>,
    Json(input): Json<CreateSavedViewInput>,
) -> Result<(StatusCode, Json<SavedView>), (StatusCode, String)> {
    db.save_view(input)
        .map(|v| (StatusCode::CREATED, Json(v)))
        .map_err(internal_error)
}

pub async fn get_view(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<SavedView>, (StatusCode, String)> {
    db.get_saved_view(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "View not found".to_string()))
}

pub async fn delete_view(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if db.delete_saved_view(id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "View not found".to_string()))
    }
}

/// Apply a saved view's filters to the current feed.
pub async fn view_features(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<FeatureQuery>,
) -> Result<Json<Vec<FeatureView>>, (StatusCode, String)> {
    let view = state
        .db
        .get_saved_view(id)
        .map_err(internal_error)?
        .ok_or((StatusCode::NOT_FOUND, "View not found".to_string()))?;

    let today = query.today();
    let records = select_features(&state, &view.config, &query).await?;
    Ok(Json(records.iter().map(|r| r.view(today)).collect()))
}
