//! Tracing subscriber setup
//!
//! JSON events go to stdout, and to a daily-rotating file when a log
//! directory is configured. `RUST_LOG` overrides the configured level.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// File name of the rotating log file inside the log directory
pub const LOG_FILE_NAME: &str = "mediawarden.log";

/// Default filter directive when `RUST_LOG` is unset
pub fn default_directive(level: &str) -> String {
    format!("mediawarden={}", level.trim().to_lowercase())
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped, so the caller
/// must keep it alive for the life of the process.
pub fn init_tracing(config: &Config) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(&config.log_level)))
        .context("Invalid log filter")?;

    let (file_layer, guard) = match config.log_dir.as_deref() {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
