//! Application state shared by the CLI commands and the scheduler.

use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::services::{
    ActionService, FfprobeProber, LibraryTasks, ScannerService, TaskRegistry, TorrentSyncService,
    TrashService,
};

/// Services wired to one database
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub scanner: Arc<ScannerService>,
    pub torrent_sync: Arc<TorrentSyncService>,
    pub trash: Arc<TrashService>,
    pub actions: Arc<ActionService>,
    pub tasks: LibraryTasks,
}

impl AppState {
    pub fn new(config: Arc<Config>, db: Database) -> Self {
        let mut scanner = ScannerService::new(db.clone());
        if config.probe_resolution {
            scanner = scanner.with_prober(Arc::new(FfprobeProber::new(config.ffprobe_path.clone())));
        }
        let scanner = Arc::new(scanner);
        let torrent_sync = Arc::new(TorrentSyncService::new(db.clone(), config.matching.clone()));
        let trash = Arc::new(TrashService::new(db.clone()));
        let actions = Arc::new(ActionService::new(db.clone(), trash.clone()));
        let tasks = LibraryTasks::new(
            db.clone(),
            scanner.clone(),
            torrent_sync.clone(),
            TaskRegistry::new(),
        );

        Self {
            config,
            db,
            scanner,
            torrent_sync,
            trash,
            actions,
            tasks,
        }
    }
}
