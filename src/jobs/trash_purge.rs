//! Expired trash purge job

use anyhow::Result;

use crate::services::TrashService;

/// Purge every trash entry past its deadline
pub async fn run_purge(trash: &TrashService) -> Result<()> {
    tracing::debug!("Running trash purge");
    let report = trash.purge_expired().await?;
    if report.failed > 0 || report.skipped > 0 {
        tracing::warn!(failed = report.failed, skipped = report.skipped, "Some trash entries were not purged");
    }
    Ok(())
}
