//! Integration tests for Plex refreshes against a stand-in server

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use mediawarden::db::{CreateLibrary, Database, LibraryRecord};
use mediawarden::services::{PlexClient, ScannerService};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

#[derive(Default)]
struct FakePlex {
    refreshed: Mutex<Vec<(String, Option<String>)>>,
}

async fn sections() -> Json<Value> {
    Json(json!({
        "MediaContainer": {
            "Directory": [
                { "key": "1", "title": "Media", "Location": [{ "path": "/media" }] },
                { "key": "2", "title": "TV", "Location": { "path": "/media/tv" } },
                { "key": "3", "title": "Music", "Location": [{ "path": "/music" }] }
            ]
        }
    }))
}

async fn refresh(
    State(plex): State<Arc<FakePlex>>,
    UrlPath(key): UrlPath<String>,
    headers: HeaderMap,
) -> StatusCode {
    let token = headers
        .get("X-Plex-Token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    plex.refreshed.lock().push((key, token));
    StatusCode::OK
}

async fn serve(plex: Arc<FakePlex>) -> String {
    let app = Router::new()
        .route("/library/sections", get(sections))
        .route("/library/sections/{key}/refresh", get(refresh))
        .with_state(plex);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn plex_library(db: &Database, root: &str, url: &str, section: Option<&str>) -> LibraryRecord {
    let mut input = CreateLibrary::new("TV", root);
    input.enable_plex = true;
    input.plex_url = Some(url.to_string());
    input.plex_token = Some("tok".into());
    input.plex_section_id = section.map(str::to_string);
    db.libraries().create(input).await.unwrap()
}

// ============================================================================
// Section resolution
// ============================================================================

#[tokio::test]
async fn test_refresh_uses_longest_matching_location() {
    let plex = Arc::new(FakePlex::default());
    let url = serve(plex.clone()).await;
    let db = Database::connect_in_memory().await.unwrap();
    let library = plex_library(&db, "/media/tv/shows", &url, None).await;

    let client = PlexClient::for_library(&library).unwrap().unwrap();
    assert!(client.refresh_library(&library).await.unwrap());

    assert_eq!(
        plex.refreshed.lock().clone(),
        vec![("2".to_string(), Some("tok".to_string()))]
    );
}

#[tokio::test]
async fn test_pinned_section_wins() {
    let plex = Arc::new(FakePlex::default());
    let url = serve(plex.clone()).await;
    let db = Database::connect_in_memory().await.unwrap();
    let library = plex_library(&db, "/media/tv", &url, Some("9")).await;

    let client = PlexClient::for_library(&library).unwrap().unwrap();
    assert!(client.refresh_library(&library).await.unwrap());

    assert_eq!(plex.refreshed.lock()[0].0, "9");
}

#[tokio::test]
async fn test_unmatched_root_does_not_refresh() {
    let plex = Arc::new(FakePlex::default());
    let url = serve(plex.clone()).await;
    let db = Database::connect_in_memory().await.unwrap();
    let library = plex_library(&db, "/srv/films", &url, None).await;

    let client = PlexClient::for_library(&library).unwrap().unwrap();
    assert!(!client.refresh_library(&library).await.unwrap());
    assert!(plex.refreshed.lock().is_empty());
}

#[tokio::test]
async fn test_disabled_library_has_no_client() {
    let db = Database::connect_in_memory().await.unwrap();
    let library = db
        .libraries()
        .create(CreateLibrary::new("TV", "/media/tv"))
        .await
        .unwrap();

    assert!(PlexClient::for_library(&library).unwrap().is_none());
}

// ============================================================================
// Scan trigger
// ============================================================================

#[tokio::test]
async fn test_scan_with_new_items_requests_refresh() {
    let plex = Arc::new(FakePlex::default());
    let url = serve(plex.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("e1.mkv"), b"video").unwrap();
    let db = Database::connect_in_memory().await.unwrap();
    let library = plex_library(&db, &dir.path().to_string_lossy(), &url, Some("2")).await;

    ScannerService::new(db.clone()).scan(&library).await.unwrap();

    // The refresh runs in the background
    let refreshed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if !plex.refreshed.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(refreshed.is_ok());
    assert_eq!(plex.refreshed.lock()[0].0, "2");
}
