//! Application configuration management

use std::env;

use anyhow::{Context, Result};

/// Default basename size tolerance for torrent matching (2 MiB)
pub const DEFAULT_SIZE_TOLERANCE_BYTES: u64 = 2 * 1024 * 1024;

/// Default suffix depths tried by the path-suffix matcher, longest first
pub const DEFAULT_SUFFIX_DEPTHS: [usize; 3] = [3, 2, 1];

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path or `sqlite://` URL
    pub database_url: String,

    /// Maximum pooled connections
    pub database_max_connections: u32,

    /// Default log level for this crate when `RUST_LOG` is unset
    pub log_level: String,

    /// Directory for the daily-rotating JSON log file (console only if unset)
    pub log_dir: Option<String>,

    /// ffprobe executable used for resolution probing
    pub ffprobe_path: String,

    /// Whether newly discovered files are probed for their resolution
    pub probe_resolution: bool,

    /// Cron expression for the expired-trash purge sweep
    pub trash_purge_cron: String,

    /// Cron expression for scanning every library (disabled when unset)
    pub library_scan_cron: Option<String>,

    /// Cron expression for torrent sync of every library (disabled when unset)
    pub torrent_sync_cron: Option<String>,

    /// Torrent matcher tuning
    pub matching: MatchTuning,
}

/// Heuristic constants used by the torrent matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchTuning {
    /// Maximum size difference (exclusive) for basename disambiguation
    pub size_tolerance_bytes: u64,

    /// Path suffix depths tried in order
    pub suffix_depths: Vec<usize>,
}

impl Default for MatchTuning {
    fn default() -> Self {
        Self {
            size_tolerance_bytes: DEFAULT_SIZE_TOLERANCE_BYTES,
            suffix_depths: DEFAULT_SUFFIX_DEPTHS.to_vec(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Prefer DATABASE_PATH, fall back to DATABASE_URL
        let database_url = get("DATABASE_PATH")
            .or_else(|| get("DATABASE_URL"))
            .unwrap_or_else(|| "./data/mediawarden.db".to_string());

        let database_max_connections = get("DATABASE_MAX_CONNECTIONS")
            .map(|v| v.parse::<u32>())
            .transpose()
            .context("Invalid DATABASE_MAX_CONNECTIONS")?
            .unwrap_or(5);

        let size_tolerance_bytes = get("TORRENT_MATCH_SIZE_TOLERANCE_BYTES")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("Invalid TORRENT_MATCH_SIZE_TOLERANCE_BYTES")?
            .unwrap_or(DEFAULT_SIZE_TOLERANCE_BYTES);

        let suffix_depths = match get("TORRENT_MATCH_SUFFIX_DEPTHS") {
            Some(raw) => parse_depths(&raw).context("Invalid TORRENT_MATCH_SUFFIX_DEPTHS")?,
            None => DEFAULT_SUFFIX_DEPTHS.to_vec(),
        };

        Ok(Self {
            database_url,
            database_max_connections,

            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_dir: get("LOG_DIR"),

            ffprobe_path: get("FFPROBE_PATH").unwrap_or_else(|| "ffprobe".to_string()),
            probe_resolution: get("PROBE_RESOLUTION")
                .map(|v| parse_bool(&v))
                .unwrap_or(true),

            trash_purge_cron: get("TRASH_PURGE_CRON")
                .unwrap_or_else(|| "0 0 */6 * * *".to_string()),
            library_scan_cron: get("LIBRARY_SCAN_CRON"),
            torrent_sync_cron: get("TORRENT_SYNC_CRON"),

            matching: MatchTuning {
                size_tolerance_bytes,
                suffix_depths,
            },
        })
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Parse a comma-separated list of positive depths, e.g. `3,2,1`
fn parse_depths(raw: &str) -> Result<Vec<usize>> {
    let mut depths = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let depth: usize = part
            .parse()
            .with_context(|| format!("'{}' is not a number", part))?;
        if depth == 0 {
            anyhow::bail!("suffix depth must be at least 1");
        }
        depths.push(depth);
    }
    Ok(depths)
}
