//! Media actions
//!
//! Removing media from a library can mean trashing the file, removing the
//! torrent that seeds it, or both. Planning reports what would happen and
//! what looks risky; executing does it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{Database, LibraryRecord, MediaItemRecord, TorrentAttribution};
use super::qbittorrent::{QbittorrentClient, QbittorrentError};
use super::seeding::SeedingRequirements;
use super::trash::{TrashError, TrashService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaAction {
    MediaOnly,
    TorrentOnly,
    Both,
}

impl MediaAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaAction::MediaOnly => "media_only",
            MediaAction::TorrentOnly => "torrent_only",
            MediaAction::Both => "both",
        }
    }

    pub fn moves_media(&self) -> bool {
        matches!(self, MediaAction::MediaOnly | MediaAction::Both)
    }

    pub fn removes_torrent(&self) -> bool {
        matches!(self, MediaAction::TorrentOnly | MediaAction::Both)
    }
}

impl FromStr for MediaAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "media_only" => Ok(MediaAction::MediaOnly),
            "torrent_only" => Ok(MediaAction::TorrentOnly),
            "both" => Ok(MediaAction::Both),
            other => bail!("Unknown media action '{}'", other),
        }
    }
}

impl fmt::Display for MediaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionPlan {
    pub action: MediaAction,
    pub media_item_id: Uuid,
    pub will_move_media: bool,
    pub will_remove_torrent: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub action: MediaAction,
    pub media_item_id: Uuid,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torrent_removed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torrent_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_moved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trashed_path: Option<String>,
}

/// Work out what an action would do to an item, with warnings
pub async fn plan_action(library: &LibraryRecord, item: &MediaItemRecord, action: MediaAction) -> ActionPlan {
    let mut warnings = Vec::new();

    if action.moves_media() {
        if item.is_in_trash {
            warnings.push("Media is already in trash.".to_string());
        }
        if item.is_missing {
            warnings.push("Media file is missing from disk.".to_string());
        }
        if let Some(warning) = hardlink_warning(&item.path).await {
            warnings.push(warning);
        }
    }

    if action.removes_torrent() && item.torrent_hash.is_none() {
        warnings.push("No torrent hash detected; torrent removal will be skipped.".to_string());
    }

    let requirements = SeedingRequirements::from_library(library);
    if requirements.is_active() && item.torrent_hash.is_some() {
        let evaluation = requirements.evaluate(&item.attribution());
        if !evaluation.satisfied {
            warnings.push(format!(
                "Seeding requirements not met: {}.",
                evaluation.unmet.join(", ")
            ));
        }
    }

    ActionPlan {
        action,
        media_item_id: item.id,
        will_move_media: action.moves_media(),
        will_remove_torrent: action.removes_torrent(),
        warnings,
    }
}

#[cfg(unix)]
async fn hardlink_warning(path: &str) -> Option<String> {
    use std::os::unix::fs::MetadataExt;

    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return None;
    }
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.nlink() > 1 => {
            Some("Media has multiple hardlinks; moving it could affect other seeds.".to_string())
        }
        Ok(_) => None,
        Err(_) => Some("Unable to check hardlink count.".to_string()),
    }
}

#[cfg(not(unix))]
async fn hardlink_warning(_path: &str) -> Option<String> {
    None
}

/// Runs planned actions against the torrent client and the trash
pub struct ActionService {
    db: Database,
    trash: Arc<TrashService>,
}

impl ActionService {
    pub fn new(db: Database, trash: Arc<TrashService>) -> Self {
        Self { db, trash }
    }

    pub async fn plan(&self, media_item_id: Uuid, action: MediaAction) -> Result<ActionPlan> {
        let (library, item) = self.load(media_item_id).await?;
        Ok(plan_action(&library, &item, action).await)
    }

    /// Remove the torrent and/or trash the media. Failures of either step
    /// are reported in the result rather than returned as errors.
    pub async fn execute(&self, media_item_id: Uuid, action: MediaAction) -> Result<ActionResult> {
        let (library, item) = self.load(media_item_id).await?;
        let plan = plan_action(&library, &item, action).await;

        let mut result = ActionResult {
            action,
            media_item_id: item.id,
            warnings: plan.warnings,
            torrent_removed: None,
            torrent_reason: None,
            media_moved: None,
            media_reason: None,
            trashed_path: None,
        };

        if plan.will_remove_torrent {
            match self.remove_torrent(&library, &item).await {
                Ok(()) => result.torrent_removed = Some(true),
                Err(reason) => {
                    warn!(media_item_id = %item.id, reason = %reason, "Torrent removal failed");
                    result.torrent_removed = Some(false);
                    result.torrent_reason = Some(reason);
                }
            }
        }

        if plan.will_move_media {
            match self.trash.trash_item(&library, &item).await {
                Ok(entry) => {
                    result.media_moved = Some(true);
                    result.trashed_path = Some(entry.trashed_path);
                }
                Err(e) => {
                    result.media_moved = Some(false);
                    result.media_reason = Some(trash_reason(&e));
                }
            }
        }

        info!(media_item_id = %item.id, action = %action, "Action executed");
        Ok(result)
    }

    async fn remove_torrent(&self, library: &LibraryRecord, item: &MediaItemRecord) -> std::result::Result<(), String> {
        let Some(hash) = item.torrent_hash.as_deref().filter(|_| library.torrent_sync_enabled()) else {
            return Err("integration_not_configured".to_string());
        };

        let client = QbittorrentClient::for_library(library)
            .await
            .map_err(|e| match e {
                QbittorrentError::NotConfigured => "integration_not_configured".to_string(),
                other => other.to_string(),
            })?;
        client
            .delete_torrent(hash, false)
            .await
            .map_err(|e| e.to_string())?;

        self.db
            .media_items()
            .update_attribution(item.id, &TorrentAttribution::default())
            .await
            .map_err(|e| format!("torrent removed but attribution not cleared: {:#}", e))?;

        Ok(())
    }

    async fn load(&self, media_item_id: Uuid) -> Result<(LibraryRecord, MediaItemRecord)> {
        let item = self
            .db
            .media_items()
            .get_by_id(media_item_id)
            .await?
            .context("Media item not found")?;
        let library = self
            .db
            .libraries()
            .get_by_id(item.library_id)
            .await?
            .context("Library not found")?;
        Ok((library, item))
    }
}

fn trash_reason(error: &TrashError) -> String {
    match error {
        TrashError::AlreadyTrashed => "already_in_trash".to_string(),
        TrashError::SourceMissing(_) => "missing".to_string(),
        other => other.to_string(),
    }
}
