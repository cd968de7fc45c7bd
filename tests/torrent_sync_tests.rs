//! Integration tests for torrent attribution
//!
//! A small axum server stands in for the qBittorrent WebUI API:
//! - path mapping from client paths to library paths
//! - login failures and missing credentials
//! - attribution updates, idempotence and clearing
//! - torrent removal through media actions

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use assert_matches::assert_matches;
use axum::extract::{Form, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use mediawarden::config::MatchTuning;
use mediawarden::db::{CreateLibrary, CreateMediaItem, Database, LibraryRecord, MediaItemRecord, TorrentAttribution};
use mediawarden::services::{
    ActionService, LibraryTasks, MediaAction, QbittorrentError, ScannerService, TaskRegistry, TaskState,
    TorrentSyncService, TrashService,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

// ============================================================================
// Fake qBittorrent
// ============================================================================

struct FakeQb {
    password: String,
    torrents: Value,
    files: HashMap<String, Value>,
    deleted: Mutex<Vec<HashMap<String, String>>>,
}

impl FakeQb {
    fn new(torrents: Value, files: &[(&str, Value)]) -> Self {
        Self {
            password: "secret".into(),
            torrents,
            files: files.iter().map(|(h, v)| (h.to_string(), v.clone())).collect(),
            deleted: Mutex::new(Vec::new()),
        }
    }
}

async fn login(State(qb): State<Arc<FakeQb>>, Form(form): Form<HashMap<String, String>>) -> Response {
    if form.get("password") == Some(&qb.password) {
        ([(header::SET_COOKIE, "SID=session; path=/")], "Ok.").into_response()
    } else {
        "Fails.".into_response()
    }
}

async fn torrents_info(State(qb): State<Arc<FakeQb>>) -> Json<Value> {
    Json(qb.torrents.clone())
}

async fn torrent_files(State(qb): State<Arc<FakeQb>>, Query(query): Query<HashMap<String, String>>) -> Response {
    match query.get("hash").and_then(|h| qb.files.get(h)) {
        Some(files) => Json(files.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

async fn delete_torrent(State(qb): State<Arc<FakeQb>>, Form(form): Form<HashMap<String, String>>) -> StatusCode {
    qb.deleted.lock().push(form);
    StatusCode::OK
}

async fn serve(qb: Arc<FakeQb>) -> String {
    let app = Router::new()
        .route("/api/v2/auth/login", post(login))
        .route("/api/v2/torrents/info", get(torrents_info))
        .route("/api/v2/torrents/files", get(torrent_files))
        .route("/api/v2/torrents/delete", post(delete_torrent))
        .with_state(qb);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn show_torrents() -> (Value, Vec<(&'static str, Value)>) {
    let torrents = json!([{
        "hash": "H1",
        "name": "show",
        "save_path": "/data/show",
        "content_path": "/data/show/e1.mkv",
        "ratio": 2.5,
        "seeding_time": 7200,
        "num_seeds": 4,
        "num_leechs": 1
    }]);
    let files = vec![("H1", json!([{ "name": "e1.mkv", "size": 1000 }]))];
    (torrents, files)
}

// ============================================================================
// Helpers
// ============================================================================

async fn library(db: &Database, root: &str, url: &str, password: Option<&str>) -> LibraryRecord {
    let mut input = CreateLibrary::new("Shows", root);
    input.enable_torrents = true;
    input.qb_url = Some(url.to_string());
    input.qb_username = Some("admin".into());
    input.qb_password = password.map(str::to_string);
    input.qb_root_path = Some("/data".into());
    db.libraries().create(input).await.unwrap()
}

async fn item(db: &Database, library: &LibraryRecord, path: &str, size: i64) -> MediaItemRecord {
    let name = Path::new(path).file_name().unwrap().to_string_lossy().into_owned();
    db.media_items()
        .create(CreateMediaItem {
            library_id: library.id,
            name,
            path: path.to_string(),
            size_bytes: size,
            modified_at: None,
            resolution: None,
            scanned_at: Utc::now(),
        })
        .await
        .unwrap()
}

async fn reload(db: &Database, item: &MediaItemRecord) -> MediaItemRecord {
    db.media_items().get_by_id(item.id).await.unwrap().unwrap()
}

fn sync_service(db: &Database) -> TorrentSyncService {
    TorrentSyncService::new(db.clone(), MatchTuning::default())
}

// ============================================================================
// Sync
// ============================================================================

#[tokio::test]
async fn test_client_root_mapping_attributes_exact_path() {
    let (torrents, files) = show_torrents();
    let url = serve(Arc::new(FakeQb::new(torrents, &files))).await;
    let db = Database::connect_in_memory().await.unwrap();
    let library = library(&db, "/lib", &url, Some("secret")).await;
    let episode = item(&db, &library, "/lib/show/e1.mkv", 1000).await;
    let other = item(&db, &library, "/lib/other/x.mkv", 5).await;
    let sync = sync_service(&db);

    let updated = sync.sync_library(library.id).await.unwrap();

    assert_eq!(updated, 1);
    assert_eq!(
        reload(&db, &episode).await.attribution(),
        TorrentAttribution {
            hash: Some("H1".into()),
            ratio: Some(2.5),
            seed_time_secs: Some(7200),
            seeders: Some(4),
            leechers: Some(1),
        }
    );
    assert_eq!(reload(&db, &other).await.attribution(), TorrentAttribution::default());

    // Nothing changed on the client, nothing to write
    assert_eq!(sync.sync_library(library.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_basename_fallback_for_relocated_file() {
    let (torrents, files) = show_torrents();
    let url = serve(Arc::new(FakeQb::new(torrents, &files))).await;
    let db = Database::connect_in_memory().await.unwrap();
    let library = library(&db, "/lib", &url, Some("secret")).await;
    let moved = item(&db, &library, "/lib/Season 1/e1.mkv", 1000).await;

    assert_eq!(sync_service(&db).sync_library(library.id).await.unwrap(), 1);
    assert_eq!(reload(&db, &moved).await.torrent_hash.as_deref(), Some("H1"));
}

#[tokio::test]
async fn test_lost_attribution_is_cleared() {
    let url = serve(Arc::new(FakeQb::new(json!([]), &[]))).await;
    let db = Database::connect_in_memory().await.unwrap();
    let library = library(&db, "/lib", &url, Some("secret")).await;
    let episode = item(&db, &library, "/lib/show/e1.mkv", 1000).await;
    db.media_items()
        .update_attribution(
            episode.id,
            &TorrentAttribution {
                hash: Some("OLD".into()),
                ratio: Some(1.0),
                seed_time_secs: Some(60),
                seeders: Some(1),
                leechers: Some(0),
            },
        )
        .await
        .unwrap();

    assert_eq!(sync_service(&db).sync_library(library.id).await.unwrap(), 1);
    assert_eq!(reload(&db, &episode).await.attribution(), TorrentAttribution::default());
}

#[tokio::test]
async fn test_failed_file_listing_skips_only_that_torrent() {
    let torrents = json!([
        { "hash": "H1", "save_path": "/data/show", "content_path": "/data/show/e1.mkv", "num_seeds": 1 },
        { "hash": "H2", "save_path": "/data/show", "content_path": "/data/show/e2.mkv", "num_seeds": 1 }
    ]);
    let files = [("H1", json!([{ "name": "e1.mkv", "size": 1000 }]))];
    let url = serve(Arc::new(FakeQb::new(torrents, &files))).await;
    let db = Database::connect_in_memory().await.unwrap();
    let library = library(&db, "/lib", &url, Some("secret")).await;
    let e1 = item(&db, &library, "/lib/show/e1.mkv", 1000).await;
    let e2 = item(&db, &library, "/lib/show/e2.mkv", 1000).await;

    assert_eq!(sync_service(&db).sync_library(library.id).await.unwrap(), 1);
    assert_eq!(reload(&db, &e1).await.torrent_hash.as_deref(), Some("H1"));
    assert_eq!(reload(&db, &e2).await.torrent_hash, None);
}

#[tokio::test]
async fn test_rejected_login_fails_the_pass() {
    let (torrents, files) = show_torrents();
    let url = serve(Arc::new(FakeQb::new(torrents, &files))).await;
    let db = Database::connect_in_memory().await.unwrap();
    let library = library(&db, "/lib", &url, Some("wrong")).await;

    let err = sync_service(&db).sync_library(library.id).await.unwrap_err();

    assert_matches!(err.downcast_ref::<QbittorrentError>(), Some(QbittorrentError::Auth(_)));
}

#[tokio::test]
async fn test_missing_credentials_skip_sync() {
    let db = Database::connect_in_memory().await.unwrap();
    let library = library(&db, "/lib", "http://127.0.0.1:9", None).await;
    item(&db, &library, "/lib/show/e1.mkv", 1000).await;

    assert_eq!(sync_service(&db).sync_library(library.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_sync_task_records_error_message() {
    let (torrents, files) = show_torrents();
    let url = serve(Arc::new(FakeQb::new(torrents, &files))).await;
    let db = Database::connect_in_memory().await.unwrap();
    let library = library(&db, "/lib", &url, Some("wrong")).await;
    let tasks = LibraryTasks::new(
        db.clone(),
        Arc::new(ScannerService::new(db.clone())),
        Arc::new(sync_service(&db)),
        TaskRegistry::new(),
    );

    let status = tasks.run_torrent_sync(library.id).await.unwrap();

    assert_eq!(status.state, TaskState::Error);
    assert!(status.error.unwrap().starts_with("Failed to connect to qBittorrent"));
}

// ============================================================================
// Media actions
// ============================================================================

#[tokio::test]
async fn test_action_both_removes_torrent_and_trashes_media() {
    let (torrents, files) = show_torrents();
    let qb = Arc::new(FakeQb::new(torrents, &files));
    let url = serve(qb.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("show")).unwrap();
    fs::write(root.join("show/e1.mkv"), vec![0u8; 1000]).unwrap();

    let db = Database::connect_in_memory().await.unwrap();
    let library = library(&db, &root.to_string_lossy(), &url, Some("secret")).await;
    ScannerService::new(db.clone()).scan(&library).await.unwrap();
    assert_eq!(sync_service(&db).sync_library(library.id).await.unwrap(), 1);
    let episode = db.media_items().list_by_library(library.id).await.unwrap().remove(0);

    let actions = ActionService::new(db.clone(), Arc::new(TrashService::new(db.clone())));
    let plan = actions.plan(episode.id, MediaAction::Both).await.unwrap();
    assert!(plan.will_move_media && plan.will_remove_torrent);
    assert!(plan.warnings.is_empty(), "unexpected warnings: {:?}", plan.warnings);

    let result = actions.execute(episode.id, MediaAction::Both).await.unwrap();

    assert_eq!(result.torrent_removed, Some(true));
    assert_eq!(result.media_moved, Some(true));
    assert!(result.trashed_path.unwrap().contains(".trash"));
    let deleted = qb.deleted.lock().clone();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].get("hashes").map(String::as_str), Some("H1"));
    assert_eq!(deleted[0].get("deleteFiles").map(String::as_str), Some("false"));

    let after = reload(&db, &episode).await;
    assert!(after.is_in_trash);
    assert_eq!(after.attribution(), TorrentAttribution::default());
}

#[tokio::test]
async fn test_action_without_hash_reports_reason() {
    let db = Database::connect_in_memory().await.unwrap();
    let mut input = CreateLibrary::new("Shows", "/lib");
    input.min_seeders = 3;
    let library = db.libraries().create(input).await.unwrap();
    let episode = item(&db, &library, "/lib/show/e1.mkv", 1000).await;
    let actions = ActionService::new(db.clone(), Arc::new(TrashService::new(db.clone())));

    let plan = actions.plan(episode.id, MediaAction::TorrentOnly).await.unwrap();
    assert!(plan.warnings.iter().any(|w| w.starts_with("No torrent hash")));

    let result = actions.execute(episode.id, MediaAction::TorrentOnly).await.unwrap();
    assert_eq!(result.torrent_removed, Some(false));
    assert_eq!(result.torrent_reason.as_deref(), Some("integration_not_configured"));
    assert_eq!(result.media_moved, None);
}
