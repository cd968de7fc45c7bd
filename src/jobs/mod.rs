//! Background job scheduling

pub mod library_sync;
pub mod trash_purge;

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::config::Config;
use crate::services::{LibraryTasks, TrashService};

/// Initialize and start the job scheduler
pub async fn start_scheduler(
    config: &Config,
    trash_service: Arc<TrashService>,
    tasks: LibraryTasks,
) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Expired trash purge
    let trash = trash_service.clone();
    let purge_job = Job::new_async(config.trash_purge_cron.as_str(), move |_uuid, _l| {
        let trash = trash.clone();
        Box::pin(async move {
            if let Err(e) = trash_purge::run_purge(&trash).await {
                tracing::error!("Trash purge error: {:#}", e);
            }
        })
    })?;
    scheduler.add(purge_job).await?;
    info!(cron = %config.trash_purge_cron, "Scheduled trash purge");

    if let Some(cron) = config.library_scan_cron.as_deref() {
        let scan_tasks = tasks.clone();
        let scan_job = Job::new_async(cron, move |_uuid, _l| {
            let tasks = scan_tasks.clone();
            Box::pin(async move {
                if let Err(e) = library_sync::scan_all(&tasks).await {
                    tracing::error!("Library scan job error: {:#}", e);
                }
            })
        })?;
        scheduler.add(scan_job).await?;
        info!(cron = %cron, "Scheduled library scans");
    }

    if let Some(cron) = config.torrent_sync_cron.as_deref() {
        let sync_tasks = tasks.clone();
        let sync_job = Job::new_async(cron, move |_uuid, _l| {
            let tasks = sync_tasks.clone();
            Box::pin(async move {
                if let Err(e) = library_sync::sync_all(&tasks).await {
                    tracing::error!("Torrent sync job error: {:#}", e);
                }
            })
        })?;
        scheduler.add(sync_job).await?;
        info!(cron = %cron, "Scheduled torrent syncs");
    }

    scheduler.start().await?;

    info!("Job scheduler started");
    Ok(scheduler)
}
