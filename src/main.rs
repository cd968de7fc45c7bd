//! Mediawarden entry point
//!
//! With no arguments it runs the scheduled jobs until interrupted; otherwise
//! it runs one command and prints its result as JSON.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use mediawarden::app::AppState;
use mediawarden::cli::{CliOptions, Command, USAGE, run_command};
use mediawarden::config::Config;
use mediawarden::db::Database;
use mediawarden::jobs::start_scheduler;
use mediawarden::services::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = CliOptions::from_args()?;
    if options.command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    dotenvy::dotenv().ok();
    let config = Arc::new(Config::from_env()?);

    // Held for the whole run so buffered file logs are flushed on exit
    let _log_guard = init_tracing(&config)?;

    let db = Database::connect(&config.database_url, config.database_max_connections).await?;
    db.migrate().await?;
    info!(database = %config.database_url, "Database ready");

    let state = AppState::new(config.clone(), db);

    match options.command {
        Command::Serve => serve(state).await,
        command => {
            let output = run_command(&state, &command).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

async fn serve(state: AppState) -> anyhow::Result<()> {
    let mut scheduler = start_scheduler(&state.config, state.trash.clone(), state.tasks.clone()).await?;

    info!("Mediawarden running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    scheduler.shutdown().await?;
    Ok(())
}
