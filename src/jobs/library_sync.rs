//! Periodic library scan and torrent sync jobs
//!
//! Both go through [`LibraryTasks`] so a scheduled run never overlaps a
//! scan or sync that is already in progress for the same library.

use anyhow::Result;
use tracing::info;

use crate::services::LibraryTasks;

pub async fn scan_all(tasks: &LibraryTasks) -> Result<()> {
    info!("Running scheduled library scans");
    let ran = tasks.scan_all().await?;
    info!(libraries = ran, "Scheduled library scans finished");
    Ok(())
}

pub async fn sync_all(tasks: &LibraryTasks) -> Result<()> {
    info!("Running scheduled torrent syncs");
    let ran = tasks.sync_all().await?;
    info!(libraries = ran, "Scheduled torrent syncs finished");
    Ok(())
}
