//! Feed client and service against an in-process HTTP server.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Duration;
use release_tracker::feed::{FeedClient, FeedError, FeedService};
use release_tracker::models::FeedSource;
use serde_json::json;
use tempfile::NamedTempFile;

#[derive(Clone)]
struct FeedServer {
    pages: Arc<Vec<(StatusCode, String)>>,
    hits: Arc<AtomicUsize>,
}

async fn serve_page(
    State(server): State<FeedServer>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    server.hits.fetch_add(1, Ordering::SeqCst);
    let page: usize = params
        .get("page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(1);
    match server.pages.get(page - 1) {
        Some((status, body)) => (*status, body.clone()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}

/// Start a feed server and return its URL and hit counter.
async fn start_server(pages: Vec<(StatusCode, String)>) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/plans/", get(serve_page))
        .with_state(FeedServer {
            pages: Arc::new(pages),
            hits: hits.clone(),
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    (format!("http://{}/plans/", addr), hits)
}

fn entry(id: &str, feature: &str) -> serde_json::Value {
    json!({
        "Release Plan ID": id,
        "Product name": "Power Apps",
        "Feature name": feature,
        "GA date": "2025-03-01"
    })
}

fn page(entries: Vec<serde_json::Value>, more: bool) -> (StatusCode, String) {
    (
        StatusCode::OK,
        json!({ "totalrecords": "3", "morerecords": more, "results": entries }).to_string(),
    )
}

fn client(url: &str, max_pages: u32) -> FeedClient {
    FeedClient::new(url, max_pages, StdDuration::from_secs(5), "test-agent")
        .expect("Failed to build client")
}

fn fallback_file(ids: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create file");
    let results: Vec<_> = ids.iter().map(|id| entry(id, "From file")).collect();
    write!(file, "{}", json!({ "morerecords": false, "results": results }))
        .expect("Failed to write file");
    file
}

mod client_pagination {
    use super::*;

    #[tokio::test]
    async fn follows_morerecords_until_false() {
        let (url, hits) = start_server(vec![
            page(vec![entry("RP-1", "A"), entry("RP-2", "B")], true),
            page(vec![entry("RP-3", "C")], false),
            page(vec![entry("RP-4", "never fetched")], false),
        ])
        .await;

        let fetched = client(&url, 10).fetch_pages().await.expect("Fetch failed");

        assert_eq!(fetched.pages.len(), 2);
        assert!(fetched.truncated.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stops_at_the_page_limit() {
        let (url, _) = start_server(vec![
            page(vec![entry("RP-1", "A")], true),
            page(vec![entry("RP-2", "B")], true),
            page(vec![entry("RP-3", "C")], true),
        ])
        .await;

        let fetched = client(&url, 2).fetch_pages().await.expect("Fetch failed");

        assert_eq!(fetched.pages.len(), 2);
        assert!(fetched.truncated.unwrap().contains("page limit"));
    }

    #[tokio::test]
    async fn keeps_earlier_pages_when_a_later_page_fails() {
        let (url, _) = start_server(vec![
            page(vec![entry("RP-1", "A")], true),
            (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()),
        ])
        .await;

        let fetched = client(&url, 10).fetch_pages().await.expect("Fetch failed");

        assert_eq!(fetched.pages.len(), 1);
        assert!(fetched.truncated.is_some());
    }

    #[tokio::test]
    async fn fails_when_the_first_page_fails() {
        let (url, _) =
            start_server(vec![(StatusCode::SERVICE_UNAVAILABLE, "down".to_string())]).await;

        let result = client(&url, 10).fetch_pages().await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn salvages_invalid_json_and_stops() {
        let broken = r#"{"morerecords": true, "results": [
            {"Release Plan ID": "RP-1", "Product name": "Power Apps", "Feature name": "A",},
            {"Release Plan ID": "RP-2", "Product name": "Power Apps", "Feature name": "B"}
        "#;
        let (url, hits) = start_server(vec![
            (StatusCode::OK, broken.to_string()),
            page(vec![entry("RP-3", "C")], false),
        ])
        .await;

        let fetched = client(&url, 10).fetch_pages().await.expect("Fetch failed");

        assert!(fetched.salvaged);
        assert_eq!(fetched.pages.len(), 1);
        assert_eq!(fetched.pages[0].results.len(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}

mod service {
    use super::*;

    #[tokio::test]
    async fn loads_from_the_network_and_caches() {
        let (url, hits) = start_server(vec![page(
            vec![entry("RP-1", "A"), json!("not an entry"), entry("RP-2", "B")],
            false,
        )])
        .await;
        let service = FeedService::new("test", Some(client(&url, 10)), None, Duration::hours(4));

        let first = service.load().await.expect("Load failed");
        assert_eq!(first.source, FeedSource::Network);
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.skipped, 1);

        let second = service.load().await.expect("Load failed");
        assert_eq!(second.source, FeedSource::Cache);
        assert_eq!(second.records.len(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let reloaded = service.reload().await.expect("Reload failed");
        assert_eq!(reloaded.source, FeedSource::Network);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_cache_fetches_again() {
        let (url, hits) = start_server(vec![page(vec![entry("RP-1", "A")], false)]).await;
        let service = FeedService::new("test", Some(client(&url, 10)), None, Duration::zero());

        service.load().await.expect("Load failed");
        service.load().await.expect("Load failed");

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn falls_back_to_the_local_file() {
        let (url, _) =
            start_server(vec![(StatusCode::SERVICE_UNAVAILABLE, "down".to_string())]).await;
        let file = fallback_file(&["RP-7", "RP-8"]);
        let service = FeedService::new(
            "test",
            Some(client(&url, 10)),
            Some(file.path().to_path_buf()),
            Duration::hours(4),
        );

        let loaded = service.load().await.expect("Load failed");

        assert_eq!(loaded.source, FeedSource::Fallback);
        assert_eq!(loaded.records[0].release_plan_id, "RP-7");
    }

    #[tokio::test]
    async fn falls_back_when_the_feed_has_no_parseable_entries() {
        let (url, _) = start_server(vec![page(vec![json!({"Product name": "X"})], false)]).await;
        let file = fallback_file(&["RP-7"]);
        let service = FeedService::new(
            "test",
            Some(client(&url, 10)),
            Some(file.path().to_path_buf()),
            Duration::hours(4),
        );

        let loaded = service.load().await.expect("Load failed");
        assert_eq!(loaded.source, FeedSource::Fallback);
    }

    #[tokio::test]
    async fn reports_unavailable_when_every_source_fails() {
        let (url, _) =
            start_server(vec![(StatusCode::SERVICE_UNAVAILABLE, "down".to_string())]).await;
        let service = FeedService::new(
            "test",
            Some(client(&url, 10)),
            Some("/nonexistent/releaseplans.json".into()),
            Duration::hours(4),
        );

        let err = service.load().await.expect_err("Load should fail");
        assert!(matches!(err, FeedError::Unreachable(_)));
    }
}
