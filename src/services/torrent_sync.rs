//! Torrent attribution sync
//!
//! Builds a fresh torrent index for a library and writes the matched
//! seeding statistics onto its items.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MatchTuning;
use crate::db::{Database, LibraryRecord};
use super::qbittorrent::{QbittorrentClient, QbittorrentError};
use super::torrent_index::{PathMapping, TorrentIndex};
use super::torrent_matcher::{MatchStage, TorrentMatcher, reconcile_attribution};

/// Outcome of applying one index to a library
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub total: usize,
    pub matched: usize,
    pub updated: usize,
    pub exact: usize,
    pub basename: usize,
    pub suffix: usize,
}

pub struct TorrentSyncService {
    db: Database,
    tuning: MatchTuning,
}

impl TorrentSyncService {
    pub fn new(db: Database, tuning: MatchTuning) -> Self {
        Self { db, tuning }
    }

    /// Sync a library by ID. Returns the number of items whose attribution changed.
    pub async fn sync_library(&self, library_id: Uuid) -> Result<usize> {
        let library = self
            .db
            .libraries()
            .get_by_id(library_id)
            .await?
            .context("Library not found")?;

        self.sync(&library).await
    }

    /// Sync a loaded library.
    ///
    /// Libraries without torrent integration, or without credentials, are
    /// skipped and report zero. A rejected login fails the pass.
    pub async fn sync(&self, library: &LibraryRecord) -> Result<usize> {
        if !library.torrent_sync_enabled() {
            debug!(library_id = %library.id, "Torrent sync not enabled, skipping");
            return Ok(0);
        }

        let client = match QbittorrentClient::for_library(library).await {
            Ok(client) => client,
            Err(QbittorrentError::NotConfigured) => {
                warn!(library_id = %library.id, "qBittorrent credentials missing, skipping torrent sync");
                return Ok(0);
            }
            Err(e) => return Err(e).context("Failed to connect to qBittorrent"),
        };

        let mapping = PathMapping::for_library(library);
        let index = TorrentIndex::build(&client, &mapping)
            .await
            .context("Failed to build torrent index")?;

        info!(
            library_id = %library.id,
            torrents = index.torrent_count(),
            paths = index.path_count(),
            "Torrent index built"
        );

        let report = self.apply_index(library, &index).await?;
        Ok(report.updated)
    }

    /// Match every item of the library against `index` and persist changes
    pub async fn apply_index(&self, library: &LibraryRecord, index: &TorrentIndex) -> Result<SyncReport> {
        let media_items = self.db.media_items();
        let items = media_items.list_by_library(library.id).await?;
        let matcher = TorrentMatcher::new(index, &items, &self.tuning);

        let mut report = SyncReport {
            total: items.len(),
            ..Default::default()
        };

        for item in &items {
            let outcome = matcher.resolve(item);
            match outcome.stage() {
                Some(MatchStage::ExactPath) => report.exact += 1,
                Some(MatchStage::Basename) => report.basename += 1,
                Some(MatchStage::PathSuffix) => report.suffix += 1,
                None => {}
            }
            if outcome.torrent().is_some() {
                report.matched += 1;
            }

            let current = item.attribution();
            if let Some(next) = reconcile_attribution(&current, outcome.torrent().map(|t| t.as_ref())) {
                media_items.update_attribution(item.id, &next).await?;
                report.updated += 1;
            }
        }

        info!(
            library_id = %library.id,
            matched = report.matched,
            total = report.total,
            updated = report.updated,
            samples = ?index.sample_paths(),
            "Torrent sync mapped"
        );

        Ok(report)
    }
}
