//! Trash lifecycle
//!
//! Moves media into a per-library `.trash` subtree, restores it, and purges
//! entries whose retention has run out. Files are only ever deleted from a
//! path that has a `.trash` component.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::{CreateTrashEntry, Database, LibraryRecord, MediaItemRecord, TrashEntryRecord};
use super::file_utils::{TRASH_DIR_NAME, has_trash_segment};

#[derive(Debug, Error)]
pub enum TrashError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("media item is already in the trash")]
    AlreadyTrashed,

    #[error("source file does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("path is not inside a trash directory: {}", .0.display())]
    InvalidTrashPath(PathBuf),

    #[error("destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

pub type TrashResult<T> = std::result::Result<T, TrashError>;

/// Outcome of a purge or bulk operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrashBatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// What happened to the file behind a purged entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeOutcome {
    Deleted,
    AlreadyGone,
    /// The path had no trash component; the file was left alone
    KeptOutsideTrash,
}

pub struct TrashService {
    db: Database,
}

impl TrashService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Move a media item's file into its library's trash
    pub async fn move_to_trash(&self, media_item_id: Uuid) -> TrashResult<TrashEntryRecord> {
        let item = self
            .db
            .media_items()
            .get_by_id(media_item_id)
            .await?
            .ok_or_else(|| TrashError::NotFound(format!("media item {}", media_item_id)))?;
        let library = self.library(item.library_id).await?;

        self.trash_item(&library, &item).await
    }

    /// Move an already loaded item into the trash of `library`
    pub async fn trash_item(&self, library: &LibraryRecord, item: &MediaItemRecord) -> TrashResult<TrashEntryRecord> {
        if item.is_in_trash {
            return Err(TrashError::AlreadyTrashed);
        }

        let source = PathBuf::from(&item.path);
        if !exists(&source).await {
            return Err(TrashError::SourceMissing(source));
        }

        let root = Path::new(&library.root_path);
        let destination = trash_destination(root, &source);
        if exists(&destination).await {
            return Err(TrashError::DestinationExists(destination));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        move_file(&source, &destination).await?;
        remove_empty_parents(&source, root).await;

        let trashed_at = Utc::now();
        let recorded = self
            .db
            .trash_entries()
            .record_trashed(CreateTrashEntry {
                library_id: library.id,
                media_item_id: item.id,
                original_path: item.path.clone(),
                trashed_path: destination.to_string_lossy().into_owned(),
                trashed_at,
                purge_after: purge_deadline(trashed_at, library.trash_retention_days),
            })
            .await;
        let entry = match recorded {
            Ok(entry) => entry,
            Err(e) => {
                undo_move(&destination, &source).await;
                return Err(TrashError::Database(e));
            }
        };

        info!(
            library_id = %library.id,
            media_item_id = %item.id,
            src = %item.path,
            dst = %entry.trashed_path,
            "Moved media to trash"
        );

        Ok(entry)
    }

    /// Move a trashed file back to where it came from. Returns the restored path.
    pub async fn restore(&self, entry_id: Uuid) -> TrashResult<String> {
        let entry = self.entry(entry_id).await?;
        self.restore_entry(&entry).await
    }

    async fn restore_entry(&self, entry: &TrashEntryRecord) -> TrashResult<String> {
        let source = PathBuf::from(&entry.trashed_path);
        let destination = PathBuf::from(&entry.original_path);

        if !exists(&source).await {
            return Err(TrashError::SourceMissing(source));
        }
        if !has_trash_segment(&source) {
            return Err(TrashError::InvalidTrashPath(source));
        }
        let path_taken = self
            .db
            .media_items()
            .find_live_by_path(entry.library_id, &entry.original_path)
            .await?
            .is_some();
        if path_taken || exists(&destination).await {
            return Err(TrashError::DestinationExists(destination));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        move_file(&source, &destination).await?;

        self.db
            .trash_entries()
            .record_restored(entry, &entry.original_path)
            .await?;

        info!(
            library_id = %entry.library_id,
            media_item_id = %entry.media_item_id,
            dst = %entry.original_path,
            "Restored media from trash"
        );

        Ok(entry.original_path.clone())
    }

    /// Purge every entry whose retention has expired
    pub async fn purge_expired(&self) -> TrashResult<TrashBatchReport> {
        let entries = self.db.trash_entries().list_expired(Utc::now()).await?;
        let report = self.purge_entries(&entries).await;

        if report.processed > 0 {
            info!(purged = report.processed, failed = report.failed, "Trash purge done");
        }
        Ok(report)
    }

    /// Purge one entry immediately, regardless of its deadline
    pub async fn purge_now(&self, entry_id: Uuid) -> TrashResult<PurgeOutcome> {
        let entry = self.entry(entry_id).await?;
        self.purge_entry(&entry).await
    }

    /// Restore every trashed item of a library
    pub async fn restore_all(&self, library_id: Uuid) -> TrashResult<TrashBatchReport> {
        let entries = self.db.trash_entries().list_by_library(library_id).await?;
        let mut report = TrashBatchReport::default();

        for entry in &entries {
            match self.restore_entry(entry).await {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    warn!(entry_id = %entry.id, error = %e, "Failed to restore trash entry");
                    report.failed += 1;
                }
            }
        }

        info!(library_id = %library_id, restored = report.processed, failed = report.failed, "Trash restore all done");
        Ok(report)
    }

    /// Purge every trashed item of a library now
    pub async fn purge_all(&self, library_id: Uuid) -> TrashResult<TrashBatchReport> {
        let entries = self.db.trash_entries().list_by_library(library_id).await?;
        let report = self.purge_entries(&entries).await;

        info!(library_id = %library_id, purged = report.processed, failed = report.failed, "Trash purge all done");
        Ok(report)
    }

    async fn purge_entries(&self, entries: &[TrashEntryRecord]) -> TrashBatchReport {
        let mut report = TrashBatchReport::default();
        for entry in entries {
            match self.purge_entry(entry).await {
                Ok(PurgeOutcome::KeptOutsideTrash) => report.skipped += 1,
                Ok(_) => report.processed += 1,
                Err(e) => {
                    error!(entry_id = %entry.id, path = %entry.trashed_path, error = %e, "Trash purge error");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Delete the trashed file (if still there) and then the entry.
    ///
    /// A path without a trash component is never deleted, but its entry is
    /// still dropped. The media item stays in the inventory, still flagged
    /// as trashed.
    async fn purge_entry(&self, entry: &TrashEntryRecord) -> TrashResult<PurgeOutcome> {
        let path = PathBuf::from(&entry.trashed_path);

        let outcome = if !exists(&path).await {
            debug!(path = %entry.trashed_path, "Trashed file already gone");
            PurgeOutcome::AlreadyGone
        } else if !has_trash_segment(&path) {
            warn!(entry_id = %entry.id, path = %entry.trashed_path, "Refusing to purge file outside trash");
            PurgeOutcome::KeptOutsideTrash
        } else {
            let metadata = tokio::fs::symlink_metadata(&path).await?;
            if metadata.is_dir() {
                tokio::fs::remove_dir_all(&path).await?;
            } else {
                tokio::fs::remove_file(&path).await?;
            }
            PurgeOutcome::Deleted
        };

        self.db.trash_entries().delete(entry.id).await?;
        Ok(outcome)
    }

    async fn entry(&self, entry_id: Uuid) -> TrashResult<TrashEntryRecord> {
        self.db
            .trash_entries()
            .get_by_id(entry_id)
            .await?
            .ok_or_else(|| TrashError::NotFound(format!("trash entry {}", entry_id)))
    }

    async fn library(&self, library_id: Uuid) -> TrashResult<LibraryRecord> {
        self.db
            .libraries()
            .get_by_id(library_id)
            .await?
            .ok_or_else(|| TrashError::NotFound(format!("library {}", library_id)))
    }
}

/// Mirror of `source` under `<root>/.trash`; files outside the root keep only their name
pub fn trash_destination(root: &Path, source: &Path) -> PathBuf {
    let trash_root = root.join(TRASH_DIR_NAME);
    match source.strip_prefix(root) {
        Ok(relative) if !relative.as_os_str().is_empty() => trash_root.join(relative),
        _ => trash_root.join(source.file_name().unwrap_or(source.as_os_str())),
    }
}

/// Deadlines are stored as text and compared lexically, so keep them in
/// four-digit years.
const MAX_RETENTION_DAYS: i64 = 365 * 1000;

fn purge_deadline(trashed_at: DateTime<Utc>, retention_days: i64) -> DateTime<Utc> {
    TimeDelta::try_days(retention_days.clamp(0, MAX_RETENTION_DAYS))
        .and_then(|retention| trashed_at.checked_add_signed(retention))
        .unwrap_or(trashed_at)
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Rename, falling back to copy and delete across filesystems
async fn move_file(source: &Path, destination: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(source, destination).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!(src = %source.display(), "Cross-device move, copying instead");
            tokio::fs::copy(source, destination).await?;
            tokio::fs::remove_file(source).await
        }
        Err(e) => Err(e),
    }
}

/// Put a trashed file back after its entry could not be recorded
async fn undo_move(trashed: &Path, original: &Path) {
    if let Some(parent) = original.parent()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        error!(path = %parent.display(), error = %e, "Failed to recreate source directory");
    }
    match move_file(trashed, original).await {
        Ok(()) => warn!(src = %trashed.display(), dst = %original.display(), "Moved file back out of trash"),
        Err(e) => error!(
            src = %trashed.display(),
            dst = %original.display(),
            error = %e,
            "Failed to move file back out of trash"
        ),
    }
}

/// Remove directories left empty by a move, stopping below `root`
async fn remove_empty_parents(source: &Path, root: &Path) {
    let mut current = source.parent();
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        if tokio::fs::remove_dir(dir).await.is_err() {
            break;
        }
        current = dir.parent();
    }
}
