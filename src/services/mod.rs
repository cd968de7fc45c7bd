//! Library services: scanning, torrent attribution, trash and integrations

pub mod actions;
pub mod file_utils;
pub mod logging;
pub mod plex;
pub mod prober;
pub mod qbittorrent;
pub mod scanner;
pub mod seeding;
pub mod tasks;
pub mod torrent_index;
pub mod torrent_matcher;
pub mod torrent_sync;
pub mod trash;
pub mod walker;

pub use actions::{ActionPlan, ActionResult, ActionService, MediaAction, plan_action};
pub use logging::init_tracing;
pub use plex::{PlexClient, PlexSection};
pub use prober::{FfprobeProber, MediaProber};
pub use qbittorrent::{QbittorrentClient, QbittorrentError, TorrentFileEntry, TorrentInfo};
pub use scanner::{ScanProgress, ScanSummary, ScannerService};
pub use seeding::{SeedingEvaluation, SeedingRequirements};
pub use tasks::{LibraryTasks, TaskKind, TaskRegistry, TaskState, TaskStatus};
pub use torrent_index::{PathMapping, TorrentIndex, map_client_path, resolve_file_paths};
pub use torrent_matcher::{MatchOutcome, MatchStage, TorrentMatcher, reconcile_attribution};
pub use torrent_sync::{SyncReport, TorrentSyncService};
pub use trash::{PurgeOutcome, TrashBatchReport, TrashError, TrashService};
pub use walker::MediaWalker;
