//! Library scanner service
//!
//! Walks a library root, diffs what is on disk against the stored
//! inventory and records creates, updates and missing transitions. A scan
//! never deletes an item; clearing missing items is a separate operation.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{CreateMediaItem, Database, LibraryRecord, MediaItemRecord, ScanObservation};
use super::plex::PlexClient;
use super::prober::MediaProber;
use super::walker::MediaWalker;

/// Counters reported while a scan is running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    pub scanned_count: usize,
    pub total_count: usize,
    pub created_count: usize,
    pub updated_count: usize,
    pub missing_count: usize,
}

/// Result of one scan pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub scanned: usize,
    pub created: usize,
    pub updated: usize,
    pub missing: usize,
}

/// Scanner service for reconciling disk state with the inventory
pub struct ScannerService {
    db: Database,
    prober: Option<Arc<dyn MediaProber>>,
}

impl ScannerService {
    /// Create a scanner without resolution probing
    pub fn new(db: Database) -> Self {
        Self { db, prober: None }
    }

    /// Probe the resolution of newly discovered files
    pub fn with_prober(mut self, prober: Arc<dyn MediaProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    /// Number of candidate files currently under a library root
    pub fn count_candidates(library: &LibraryRecord) -> usize {
        if !library.enable_filesystem {
            return 0;
        }
        MediaWalker::for_library(&library.root_path).count()
    }

    /// Scan a library without progress reporting
    pub async fn scan(&self, library: &LibraryRecord) -> Result<ScanSummary> {
        self.scan_library(library, None, &|_: &ScanProgress| {}).await
    }

    /// Scan a library, calling `progress` after every file and once at the end.
    ///
    /// `total_hint` is the pre-counted number of candidate files, if known.
    pub async fn scan_library(
        &self,
        library: &LibraryRecord,
        total_hint: Option<usize>,
        progress: &(dyn Fn(&ScanProgress) + Send + Sync),
    ) -> Result<ScanSummary> {
        if !library.enable_filesystem {
            debug!(library_id = %library.id, "Filesystem scanning disabled, skipping");
            return Ok(ScanSummary::default());
        }

        info!(library_id = %library.id, root = %library.root_path, "Starting library scan");

        if !Path::new(&library.root_path).exists() {
            warn!(library_id = %library.id, root = %library.root_path, "Library root does not exist");
        }

        let media_items = self.db.media_items();
        let known: HashMap<String, MediaItemRecord> = media_items
            .list_live_by_library(library.id)
            .await
            .context("Failed to load library inventory")?
            .into_iter()
            .map(|item| (item.path.clone(), item))
            .collect();

        let mut seen: HashSet<String> = HashSet::new();
        let mut state = ScanProgress {
            total_count: total_hint.unwrap_or(0),
            ..Default::default()
        };

        let walker = MediaWalker::for_library(&library.root_path);
        for path in walker.walk() {
            let path_str = path.to_string_lossy().into_owned();
            seen.insert(path_str.clone());
            state.scanned_count += 1;

            let metadata = match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    // Vanished between listing and stat
                    debug!(path = %path_str, error = %e, "Skipping file that could not be read");
                    continue;
                }
            };

            let observed = ScanObservation {
                size_bytes: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
                modified_at: metadata.modified().ok().map(to_utc),
                scanned_at: Utc::now(),
            };

            match known.get(&path_str) {
                None => {
                    let resolution = match &self.prober {
                        Some(prober) => prober.probe(&path).await,
                        None => None,
                    };
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path_str.clone());

                    media_items
                        .create(CreateMediaItem {
                            library_id: library.id,
                            name,
                            path: path_str.clone(),
                            size_bytes: observed.size_bytes,
                            modified_at: observed.modified_at,
                            resolution,
                            scanned_at: observed.scanned_at,
                        })
                        .await
                        .with_context(|| format!("Failed to record {}", path_str))?;

                    debug!(path = %path_str, "Added new media item");
                    state.created_count += 1;
                }
                Some(item) => {
                    let changed = item.size_bytes != observed.size_bytes
                        || item.modified_at != observed.modified_at
                        || item.is_missing;

                    media_items
                        .record_scan(item.id, observed)
                        .await
                        .with_context(|| format!("Failed to update {}", path_str))?;

                    if changed {
                        state.updated_count += 1;
                    }
                }
            }

            progress(&state);
        }

        for item in known.values() {
            if seen.contains(&item.path) || item.is_missing {
                continue;
            }
            if media_items.mark_missing(item.id).await? {
                debug!(path = %item.path, "Media item missing from disk");
                state.missing_count += 1;
            }
        }

        self.db.libraries().update_last_scanned(library.id).await?;

        if total_hint.is_none() {
            state.total_count = state.scanned_count;
        }
        progress(&state);

        if library.plex_enabled() && (state.created_count > 0 || state.updated_count > 0) {
            spawn_plex_refresh(library.clone());
        }

        let summary = ScanSummary {
            scanned: seen.len(),
            created: state.created_count,
            updated: state.updated_count,
            missing: state.missing_count,
        };

        info!(
            library_id = %library.id,
            scanned = summary.scanned,
            created = summary.created,
            updated = summary.updated,
            missing = summary.missing,
            "Library scan complete"
        );

        Ok(summary)
    }
}

/// Truncated to microseconds so stored and freshly read values compare equal
fn to_utc(time: std::time::SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time).trunc_subsecs(6)
}

/// Ask Plex to pick up the changes without holding up the scan
fn spawn_plex_refresh(library: LibraryRecord) {
    tokio::spawn(async move {
        let result = match PlexClient::for_library(&library) {
            Ok(Some(client)) => client.refresh_library(&library).await.map(|_| ()),
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(library_id = %library.id, error = %e, "Plex refresh failed");
        }
    });
}
