mod handlers;
mod middleware;

pub use middleware::{RateLimiter, SecurityConfig};

use std::sync::Arc;

use axum::{
    extract::FromRef,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::db::Database;
use crate::feed::FeedService;

/// Shared state of the HTTP API.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub feed: Arc<FeedService>,
}

impl FromRef<AppState> for Database {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

pub fn create_router(db: Database, feed: Arc<FeedService>) -> Router {
    create_router_with_config(db, feed, SecurityConfig::from_env())
}

pub fn create_router_with_config(
    db: Database,
    feed: Arc<FeedService>,
    security: SecurityConfig,
) -> Router {
    let state = AppState { db, feed };

    let protected = Router::new()
        // Features (live feed)
        .route("/features", get(handlers::list_features))
        .route("/features/export.csv", get(handlers::export_features))
        .route("/features/summary", get(handlers::feature_summary))
        .route("/features/{id}", get(handlers::get_feature))
        .route("/features/{id}/changes", get(handlers::get_feature_changes))
        .route(
            "/features/{id}/notes",
            get(handlers::list_notes).post(handlers::create_note),
        )
        // Refresh
        .route("/refresh", post(handlers::refresh))
        .route("/refreshes", get(handlers::list_refreshes))
        .route("/snapshots", get(handlers::list_snapshots))
        // Change log
        .route("/changes", get(handlers::recent_changes))
        .route("/changes/summary", get(handlers::change_summary))
        // Notes (by note id)
        .route(
            "/notes/{id}",
            put(handlers::update_note).delete(handlers::delete_note),
        )
        // Watchlists
        .route("/users/{user}/watchlist", get(handlers::get_watchlist))
        .route(
            "/users/{user}/watchlist/{id}",
            put(handlers::add_to_watchlist).delete(handlers::remove_from_watchlist),
        )
        // Saved views
        .route(
            "/views",
            get(handlers::list_views).post(handlers::create_view),
        )
        .route(
            "/views/{id}",
            get(handlers::get_view).delete(handlers::delete_view),
        )
        .route("/views/{id}/features", get(handlers::view_features))
        .route_layer(from_fn_with_state(
            security.clone(),
            middleware::auth_middleware,
        ));

    let mut api = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected);

    if let Some(limiter) = security.rate_limiter.clone() {
        api = api.layer(from_fn_with_state(limiter, middleware::rate_limit_middleware));
    }

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(security.cors_layer())
        .with_state(state)
}
