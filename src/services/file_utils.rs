//! File and path helpers shared by the scanner, torrent matcher and trash.

use std::path::Path;

/// Video file extensions we recognize
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "mov", "m4v", "wmv", "flv", "ts"];

/// Name of the per-library trash directory
pub const TRASH_DIR_NAME: &str = ".trash";

/// Check if a path has a recognized video extension (case-insensitive)
pub fn is_video_file(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Normalize separators to forward slashes
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Last component of a slash-separated path
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Join a torrent file name onto a client directory.
///
/// Absolute names replace the base, like `os.path.join`.
pub fn join_client_path(base: &str, name: &str) -> String {
    if name.starts_with('/') || base.is_empty() {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Whether any component of `path` is the trash directory
pub fn has_trash_segment(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .components()
        .any(|c| c.as_os_str() == TRASH_DIR_NAME)
}

/// Lowercased key made of the last `depth` components of a path.
///
/// Returns `None` when the path has fewer than `depth` components.
pub fn suffix_key(path: &str, depth: usize) -> Option<String> {
    let normalized = normalize_path(path);
    let parts: Vec<&str> = normalized.split('/').collect();
    if depth == 0 || parts.len() < depth {
        return None;
    }
    Some(parts[parts.len() - depth..].join("/").to_lowercase())
}
