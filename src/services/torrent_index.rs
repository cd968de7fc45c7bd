//! Torrent file index
//!
//! Resolves every file the torrent client reports into the library's own
//! path space and indexes it by exact path and by basename.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::db::LibraryRecord;
use super::file_utils::{basename, join_client_path, normalize_path};
use super::qbittorrent::{QbResult, QbittorrentClient, TorrentFileEntry, TorrentInfo};

const MAX_SAMPLE_PATHS: usize = 3;

/// Roots used to translate client-side paths into library paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub client_root: Option<String>,
    pub library_root: String,
    pub library_name: String,
}

impl PathMapping {
    pub fn for_library(library: &LibraryRecord) -> Self {
        Self {
            client_root: library.qb_root_path.clone().filter(|r| !r.trim().is_empty()),
            library_root: library.root_path.clone(),
            library_name: library.name.clone(),
        }
    }

    pub fn map(&self, client_path: &str) -> String {
        map_client_path(
            client_path,
            self.client_root.as_deref(),
            &self.library_root,
            &self.library_name,
        )
    }
}

/// Translate a client-side path into the library's path space.
///
/// An explicit client root is replaced by the library root when it prefixes
/// the path on a segment boundary. Otherwise the first segment equal
/// (case-insensitively) to the library root's directory name or the library
/// name is spliced onto the library root. Paths no rule applies to come back
/// normalized but otherwise unchanged.
pub fn map_client_path(
    client_path: &str,
    client_root: Option<&str>,
    library_root: &str,
    library_name: &str,
) -> String {
    let normalized = normalize_path(client_path);
    let library_root = normalize_path(library_root);
    let library_root = library_root.trim_end_matches('/');

    if let Some(client_root) = client_root {
        let client_root = normalize_path(client_root);
        let client_root = client_root.trim_end_matches('/');
        if let Some(suffix) = normalized.strip_prefix(client_root)
            && (suffix.is_empty() || suffix.starts_with('/'))
        {
            return format!("{}{}", library_root, suffix);
        }
    }

    let library_base = library_root.rsplit('/').next().unwrap_or_default().to_lowercase();
    let library_name = library_name.trim().to_lowercase();
    let parts: Vec<&str> = normalized.split('/').collect();

    for (idx, part) in parts.iter().enumerate() {
        let lower = part.to_lowercase();
        if lower.is_empty() {
            continue;
        }
        if lower == library_base || (!library_name.is_empty() && lower == library_name) {
            let rest = &parts[idx + 1..];
            return if rest.is_empty() {
                library_root.to_string()
            } else {
                format!("{}/{}", library_root, rest.join("/"))
            };
        }
    }

    normalized
}

/// Client-side absolute paths (with reported sizes) for a torrent's files
pub fn resolve_file_paths(torrent: &TorrentInfo, files: &[TorrentFileEntry]) -> Vec<(String, Option<u64>)> {
    let save_path = normalize_path(torrent.save_path.as_deref().unwrap_or_default());
    let content_path = normalize_path(torrent.content_path.as_deref().unwrap_or_default());

    if !files.is_empty() && !save_path.is_empty() {
        return files
            .iter()
            .map(|f| (join_client_path(&save_path, &f.name), f.size))
            .collect();
    }

    if content_path.is_empty() {
        return Vec::new();
    }

    if files.is_empty() {
        vec![(content_path, None)]
    } else {
        files
            .iter()
            .map(|f| (join_client_path(&content_path, &f.name), f.size))
            .collect()
    }
}

/// A torrent that owns a file with a given basename
#[derive(Debug, Clone)]
pub struct BasenameCandidate {
    pub torrent: Arc<TorrentInfo>,
    pub size: Option<u64>,
}

/// Lookup tables built from one listing of the torrent client
#[derive(Debug, Default)]
pub struct TorrentIndex {
    by_path: HashMap<String, Arc<TorrentInfo>>,
    by_basename: HashMap<String, Vec<BasenameCandidate>>,
    sample_paths: Vec<String>,
    torrent_count: usize,
}

impl TorrentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// List every torrent the client reports and index its files
    pub async fn build(client: &QbittorrentClient, mapping: &PathMapping) -> QbResult<Self> {
        let torrents = client.torrents().await?;
        let mut index = Self::new();

        for torrent in torrents {
            if torrent.hash.is_empty() {
                continue;
            }
            let files = match client.torrent_files(&torrent.hash).await {
                Ok(files) => files,
                Err(e) => {
                    warn!(hash = %torrent.hash, error = %e, "Failed to list torrent files, skipping torrent");
                    continue;
                }
            };
            index.insert_torrent(torrent, &files, mapping);
        }

        debug!(
            torrents = index.torrent_count,
            paths = index.by_path.len(),
            samples = ?index.sample_paths,
            "Torrent index built"
        );

        Ok(index)
    }

    /// Index one torrent's files. Later torrents win exact-path collisions.
    pub fn insert_torrent(&mut self, torrent: TorrentInfo, files: &[TorrentFileEntry], mapping: &PathMapping) {
        let paths = resolve_file_paths(&torrent, files);
        let torrent = Arc::new(torrent);
        self.torrent_count += 1;

        for (client_path, size) in paths {
            let mapped = mapping.map(&client_path);
            let base = basename(&mapped);
            if !base.is_empty() {
                self.by_basename
                    .entry(base.to_string())
                    .or_default()
                    .push(BasenameCandidate {
                        torrent: Arc::clone(&torrent),
                        size,
                    });
            }
            if self.sample_paths.len() < MAX_SAMPLE_PATHS {
                self.sample_paths.push(mapped.clone());
            }
            self.by_path.insert(mapped, Arc::clone(&torrent));
        }
    }

    pub fn exact(&self, path: &str) -> Option<&Arc<TorrentInfo>> {
        self.by_path.get(path)
    }

    pub fn basename_candidates(&self, name: &str) -> &[BasenameCandidate] {
        self.by_basename.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Up to three mapped paths, for diagnosing mapping problems
    pub fn sample_paths(&self) -> &[String] {
        &self.sample_paths
    }

    pub fn torrent_count(&self) -> usize {
        self.torrent_count
    }

    /// Number of distinct indexed paths
    pub fn path_count(&self) -> usize {
        self.by_path.len()
    }
}
