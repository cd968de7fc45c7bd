//! Media file discovery
//!
//! Walks a library root and yields every file with a recognized video
//! extension. The walk is lazy and can be restarted by calling
//! [`MediaWalker::walk`] again.

use std::path::PathBuf;

use tracing::debug;
use walkdir::WalkDir;

use super::file_utils::{TRASH_DIR_NAME, is_video_file};

/// Lazy walker over the video files below a root directory
#[derive(Debug, Clone)]
pub struct MediaWalker {
    root: PathBuf,
    skip_dirs: Vec<String>,
}

impl MediaWalker {
    /// Walk everything below `root`, hidden directories included
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            skip_dirs: Vec::new(),
        }
    }

    /// Walk a library root, leaving out its trash subtree
    pub fn for_library(root: impl Into<PathBuf>) -> Self {
        Self::new(root).skip_dir(TRASH_DIR_NAME)
    }

    /// Do not descend into the top-level directory with this name
    pub fn skip_dir(mut self, name: impl Into<String>) -> Self {
        self.skip_dirs.push(name.into());
        self
    }

    /// Start a fresh pass over the tree.
    ///
    /// A missing root yields nothing. Entries that fail to read are skipped.
    pub fn walk(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                // Skip names only apply to the root's direct children
                entry.depth() != 1
                    || !entry.file_type().is_dir()
                    || !self
                        .skip_dirs
                        .iter()
                        .any(|skip| entry.file_name() == skip.as_str())
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(root = %self.root.display(), error = %e, "Skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() || entry.path_is_symlink())
            .map(|entry| entry.into_path())
            .filter(|path| is_video_file(path))
    }

    /// Count the candidate files without keeping them
    pub fn count(&self) -> usize {
        self.walk().count()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_walk_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Show/S01/e1.mkv"));
        touch(&dir.path().join("Show/S01/e2.MP4"));
        touch(&dir.path().join("Show/S01/e1.srt"));
        touch(&dir.path().join("Movie/movie.webm"));

        let mut found: Vec<PathBuf> = MediaWalker::new(dir.path()).walk().collect();
        found.sort();

        assert_eq!(
            found,
            vec![
                dir.path().join("Show/S01/e1.mkv"),
                dir.path().join("Show/S01/e2.MP4"),
            ]
        );
    }

    #[test]
    fn test_walk_includes_hidden_but_skips_trash() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join(".hidden/clip.mkv"));
        touch(&dir.path().join(".trash/Show/old.mkv"));

        let found: Vec<PathBuf> = MediaWalker::for_library(dir.path()).walk().collect();
        assert_eq!(found, vec![dir.path().join(".hidden/clip.mkv")]);

        // Without the skip rule the trash is walked like anything else
        assert_eq!(MediaWalker::new(dir.path()).count(), 2);
    }

    #[test]
    fn test_nested_trash_folder_is_walked() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join(".trash/x.mkv"));
        touch(&dir.path().join("Show/.trash/e1.mkv"));

        let found: Vec<PathBuf> = MediaWalker::for_library(dir.path()).walk().collect();
        assert_eq!(found, vec![dir.path().join("Show/.trash/e1.mkv")]);
    }

    #[test]
    fn test_missing_root_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let walker = MediaWalker::new(dir.path().join("does-not-exist"));
        assert_eq!(walker.walk().count(), 0);
    }

    #[test]
    fn test_walk_is_restartable() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.mkv"));
        let walker = MediaWalker::new(dir.path());
        assert_eq!(walker.count(), 1);

        touch(&dir.path().join("b.mkv"));
        assert_eq!(walker.count(), 2);
    }
}
