//! Background scan and torrent sync tasks
//!
//! At most one task of each kind runs per library. Progress is kept in a
//! shared [`TaskRegistry`] that observers read as snapshots.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::db::Database;
use super::scanner::{ScanProgress, ScanSummary, ScannerService};
use super::torrent_sync::TorrentSyncService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Scan,
    TorrentSync,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    Idle,
    Running,
    Done,
    Error,
}

/// Status of the latest task of one kind for one library
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStatus {
    pub state: TaskState,
    pub scanned_count: usize,
    pub total_count: usize,
    pub created_count: usize,
    pub updated_count: usize,
    pub missing_count: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TaskStatus {
    pub fn is_running(&self) -> bool {
        self.state == TaskState::Running
    }

    fn apply_progress(&mut self, progress: &ScanProgress) {
        self.scanned_count = progress.scanned_count;
        self.total_count = progress.total_count;
        self.created_count = progress.created_count;
        self.updated_count = progress.updated_count;
        self.missing_count = progress.missing_count;
    }
}

/// Shared per-library task status, keyed by library and task kind
#[derive(Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<Mutex<HashMap<(Uuid, TaskKind), TaskStatus>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a task as running. Returns false if it already is.
    pub fn try_begin(&self, library_id: Uuid, kind: TaskKind) -> bool {
        let mut tasks = self.inner.lock();
        let status = tasks.entry((library_id, kind)).or_default();
        if status.is_running() {
            return false;
        }
        *status = TaskStatus {
            state: TaskState::Running,
            started_at: Some(Utc::now()),
            ..Default::default()
        };
        true
    }

    pub fn update(&self, library_id: Uuid, kind: TaskKind, f: impl FnOnce(&mut TaskStatus)) {
        let mut tasks = self.inner.lock();
        f(tasks.entry((library_id, kind)).or_default());
    }

    /// Record the end of a task
    pub fn finish(&self, library_id: Uuid, kind: TaskKind, outcome: std::result::Result<(), String>) {
        self.update(library_id, kind, |status| {
            status.finished_at = Some(Utc::now());
            match outcome {
                Ok(()) => status.state = TaskState::Done,
                Err(message) => {
                    status.state = TaskState::Error;
                    status.error = Some(message);
                }
            }
        });
    }

    /// Copy of the current status; unknown tasks read as idle
    pub fn snapshot(&self, library_id: Uuid, kind: TaskKind) -> TaskStatus {
        self.inner
            .lock()
            .get(&(library_id, kind))
            .cloned()
            .unwrap_or_default()
    }
}

/// Launches scans and torrent syncs while keeping the registry current
#[derive(Clone)]
pub struct LibraryTasks {
    db: Database,
    scanner: Arc<ScannerService>,
    torrent_sync: Arc<TorrentSyncService>,
    registry: TaskRegistry,
}

impl LibraryTasks {
    pub fn new(
        db: Database,
        scanner: Arc<ScannerService>,
        torrent_sync: Arc<TorrentSyncService>,
        registry: TaskRegistry,
    ) -> Self {
        Self {
            db,
            scanner,
            torrent_sync,
            registry,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Start a scan in the background. Returns false if one is already running.
    pub fn spawn_scan(&self, library_id: Uuid) -> bool {
        if !self.registry.try_begin(library_id, TaskKind::Scan) {
            return false;
        }
        let tasks = self.clone();
        tokio::spawn(run_guarded(self.registry.clone(), library_id, TaskKind::Scan, async move {
            tasks.execute_scan(library_id).await
        }));
        true
    }

    /// Run a scan to completion. `None` if one is already running.
    pub async fn run_scan(&self, library_id: Uuid) -> Option<TaskStatus> {
        if !self.registry.try_begin(library_id, TaskKind::Scan) {
            return None;
        }
        let tasks = self.clone();
        run_guarded(self.registry.clone(), library_id, TaskKind::Scan, async move {
            tasks.execute_scan(library_id).await
        })
        .await;
        Some(self.registry.snapshot(library_id, TaskKind::Scan))
    }

    /// Start a torrent sync in the background. Returns false if one is already running.
    pub fn spawn_torrent_sync(&self, library_id: Uuid) -> bool {
        if !self.registry.try_begin(library_id, TaskKind::TorrentSync) {
            return false;
        }
        let tasks = self.clone();
        tokio::spawn(run_guarded(self.registry.clone(), library_id, TaskKind::TorrentSync, async move {
            tasks.execute_torrent_sync(library_id).await
        }));
        true
    }

    /// Run a torrent sync to completion. `None` if one is already running.
    pub async fn run_torrent_sync(&self, library_id: Uuid) -> Option<TaskStatus> {
        if !self.registry.try_begin(library_id, TaskKind::TorrentSync) {
            return None;
        }
        let tasks = self.clone();
        run_guarded(self.registry.clone(), library_id, TaskKind::TorrentSync, async move {
            tasks.execute_torrent_sync(library_id).await
        })
        .await;
        Some(self.registry.snapshot(library_id, TaskKind::TorrentSync))
    }

    /// Scan every library with filesystem scanning enabled, one after another
    pub async fn scan_all(&self) -> Result<usize> {
        let libraries = self.db.libraries().list().await?;
        let mut ran = 0;
        for library in libraries.iter().filter(|l| l.enable_filesystem) {
            if self.run_scan(library.id).await.is_some() {
                ran += 1;
            }
        }
        Ok(ran)
    }

    /// Sync every library with torrent integration configured
    pub async fn sync_all(&self) -> Result<usize> {
        let libraries = self.db.libraries().list().await?;
        let mut ran = 0;
        for library in libraries.iter().filter(|l| l.torrent_sync_enabled()) {
            if self.run_torrent_sync(library.id).await.is_some() {
                ran += 1;
            }
        }
        Ok(ran)
    }

    async fn execute_scan(&self, library_id: Uuid) {
        let outcome = match self.scan(library_id).await {
            Ok(summary) => {
                info!(library_id = %library_id, scanned = summary.scanned, "Scan task finished");
                Ok(())
            }
            Err(e) => {
                error!(library_id = %library_id, error = %format!("{:#}", e), "Scan task failed");
                Err(format!("{:#}", e))
            }
        };
        self.registry.finish(library_id, TaskKind::Scan, outcome);
    }

    async fn scan(&self, library_id: Uuid) -> Result<ScanSummary> {
        let library = self
            .db
            .libraries()
            .get_by_id(library_id)
            .await?
            .context("Library not found")?;

        let counted = library.clone();
        let total = tokio::task::spawn_blocking(move || ScannerService::count_candidates(&counted))
            .await
            .context("File count task failed")?;
        self.registry
            .update(library_id, TaskKind::Scan, |status| status.total_count = total);

        let registry = self.registry.clone();
        let progress = move |p: &ScanProgress| {
            registry.update(library_id, TaskKind::Scan, |status| status.apply_progress(p));
        };

        self.scanner.scan_library(&library, Some(total), &progress).await
    }

    async fn execute_torrent_sync(&self, library_id: Uuid) {
        let outcome = match self.torrent_sync.sync_library(library_id).await {
            Ok(updated) => {
                self.registry.update(library_id, TaskKind::TorrentSync, |status| {
                    status.updated_count = updated
                });
                info!(library_id = %library_id, updated, "Torrent sync task finished");
                Ok(())
            }
            Err(e) => {
                error!(library_id = %library_id, error = %format!("{:#}", e), "Torrent sync task failed");
                Err(format!("{:#}", e))
            }
        };
        self.registry.finish(library_id, TaskKind::TorrentSync, outcome);
    }
}

/// Run a task body on its own tokio task; if it panics, record the task as failed
async fn run_guarded<F>(registry: TaskRegistry, library_id: Uuid, kind: TaskKind, body: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = tokio::spawn(body).await {
        error!(library_id = %library_id, ?kind, error = %e, "Task aborted");
        registry.finish(library_id, kind, Err(format!("task aborted: {}", e)));
    }
}
