//! Torrent matching
//!
//! Resolves the torrent that owns a media item through an ordered cascade
//! of strategies: exact path, basename (disambiguated by size), then path
//! suffix. Each stage returns a match, no match, or ambiguous; ambiguity is
//! treated like no match and the cascade moves on.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::MatchTuning;
use crate::db::{MediaItemRecord, TorrentAttribution};
use super::file_utils::{basename, suffix_key};
use super::qbittorrent::TorrentInfo;
use super::torrent_index::TorrentIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStage {
    ExactPath,
    Basename,
    PathSuffix,
}

#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched {
        torrent: Arc<TorrentInfo>,
        stage: MatchStage,
    },
    Ambiguous,
    NoMatch,
}

impl MatchOutcome {
    pub fn torrent(&self) -> Option<&Arc<TorrentInfo>> {
        match self {
            MatchOutcome::Matched { torrent, .. } => Some(torrent),
            _ => None,
        }
    }

    pub fn stage(&self) -> Option<MatchStage> {
        match self {
            MatchOutcome::Matched { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Suffix keys at each configured depth mapped to the library item paths sharing them
#[derive(Debug, Default)]
struct SuffixIndex {
    by_depth: HashMap<usize, HashMap<String, Vec<String>>>,
}

impl SuffixIndex {
    fn build<'a>(paths: impl Iterator<Item = &'a str>, depths: &[usize]) -> Self {
        let mut by_depth: HashMap<usize, HashMap<String, Vec<String>>> = HashMap::new();
        for path in paths {
            for &depth in depths {
                if let Some(key) = suffix_key(path, depth) {
                    by_depth
                        .entry(depth)
                        .or_default()
                        .entry(key)
                        .or_default()
                        .push(path.to_string());
                }
            }
        }
        Self { by_depth }
    }

    fn get(&self, depth: usize, key: &str) -> &[String] {
        self.by_depth
            .get(&depth)
            .and_then(|keys| keys.get(key))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Matches a library's items against one torrent index.
///
/// The item suffix table is built once, when the matcher is created.
pub struct TorrentMatcher<'a> {
    index: &'a TorrentIndex,
    tuning: &'a MatchTuning,
    item_suffixes: SuffixIndex,
}

impl<'a> TorrentMatcher<'a> {
    pub fn new(index: &'a TorrentIndex, items: &[MediaItemRecord], tuning: &'a MatchTuning) -> Self {
        let item_suffixes = SuffixIndex::build(items.iter().map(|i| i.path.as_str()), &tuning.suffix_depths);
        Self {
            index,
            tuning,
            item_suffixes,
        }
    }

    /// Run the cascade for one item
    pub fn resolve(&self, item: &MediaItemRecord) -> MatchOutcome {
        let stages: [fn(&Self, &MediaItemRecord) -> MatchOutcome; 3] =
            [Self::match_exact, Self::match_basename, Self::match_suffix];

        for stage in stages {
            if let outcome @ MatchOutcome::Matched { .. } = stage(self, item) {
                return outcome;
            }
        }
        MatchOutcome::NoMatch
    }

    fn match_exact(&self, item: &MediaItemRecord) -> MatchOutcome {
        match self.index.exact(&item.path) {
            Some(torrent) => MatchOutcome::Matched {
                torrent: Arc::clone(torrent),
                stage: MatchStage::ExactPath,
            },
            None => MatchOutcome::NoMatch,
        }
    }

    /// A unique candidate wins outright; several are narrowed by size
    fn match_basename(&self, item: &MediaItemRecord) -> MatchOutcome {
        let candidates = self.index.basename_candidates(basename(&item.path));
        let matched = |torrent: &Arc<TorrentInfo>| MatchOutcome::Matched {
            torrent: Arc::clone(torrent),
            stage: MatchStage::Basename,
        };

        match candidates {
            [] => MatchOutcome::NoMatch,
            [only] => matched(&only.torrent),
            _ => {
                let Ok(item_size) = u64::try_from(item.size_bytes) else {
                    return MatchOutcome::Ambiguous;
                };
                if item_size == 0 {
                    return MatchOutcome::Ambiguous;
                }
                candidates
                    .iter()
                    .find(|c| {
                        c.size.is_some_and(|size| {
                            size > 0 && size.abs_diff(item_size) < self.tuning.size_tolerance_bytes
                        })
                    })
                    .map(|c| matched(&c.torrent))
                    .unwrap_or(MatchOutcome::Ambiguous)
            }
        }
    }

    /// Deepest suffix first. The suffix must identify exactly one library
    /// item, and the torrent is whatever the index holds at that item's path.
    fn match_suffix(&self, item: &MediaItemRecord) -> MatchOutcome {
        let mut ambiguous = false;

        for &depth in &self.tuning.suffix_depths {
            let Some(key) = suffix_key(&item.path, depth) else {
                continue;
            };
            match self.item_suffixes.get(depth, &key) {
                [owner] => {
                    if let Some(torrent) = self.index.exact(owner) {
                        return MatchOutcome::Matched {
                            torrent: Arc::clone(torrent),
                            stage: MatchStage::PathSuffix,
                        };
                    }
                }
                [] => {}
                _ => ambiguous = true,
            }
        }

        if ambiguous {
            MatchOutcome::Ambiguous
        } else {
            MatchOutcome::NoMatch
        }
    }
}

/// New attribution for an item, or `None` when nothing would change.
///
/// A match always sets the hash; the statistics are only overwritten when
/// the client reported them. Losing the match clears all five fields.
pub fn reconcile_attribution(
    current: &TorrentAttribution,
    torrent: Option<&TorrentInfo>,
) -> Option<TorrentAttribution> {
    let next = match torrent {
        Some(torrent) => TorrentAttribution {
            hash: Some(torrent.hash.clone()),
            ratio: torrent.ratio.or(current.ratio),
            seed_time_secs: torrent.seeding_time.or(current.seed_time_secs),
            seeders: torrent.num_seeds.or(current.seeders),
            leechers: torrent.num_leechs.or(current.leechers),
        },
        None => TorrentAttribution::default(),
    };

    (next != *current).then_some(next)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::*;
    use crate::services::qbittorrent::TorrentFileEntry;
    use crate::services::torrent_index::PathMapping;

    fn item(path: &str, size: i64) -> MediaItemRecord {
        MediaItemRecord {
            id: Uuid::new_v4(),
            library_id: Uuid::nil(),
            name: basename(path).to_string(),
            path: path.to_string(),
            size_bytes: size,
            resolution: None,
            modified_at: None,
            last_watched_at: None,
            last_scan_at: None,
            torrent_hash: None,
            torrent_ratio: None,
            torrent_seed_time: None,
            torrent_seeders: None,
            torrent_leechers: None,
            is_in_trash: false,
            is_missing: false,
            trashed_at: None,
            trashed_path: None,
            created_at: Utc::now(),
        }
    }

    fn torrent(hash: &str) -> TorrentInfo {
        TorrentInfo {
            hash: hash.to_string(),
            save_path: Some("/data".to_string()),
            ratio: Some(2.0),
            seeding_time: Some(7200),
            num_seeds: Some(5),
            num_leechs: Some(1),
            ..Default::default()
        }
    }

    fn file(name: &str, size: u64) -> TorrentFileEntry {
        TorrentFileEntry {
            name: name.to_string(),
            size: Some(size),
        }
    }

    fn index_of(entries: &[(&str, &[TorrentFileEntry])]) -> TorrentIndex {
        let mapping = PathMapping {
            client_root: Some("/data".into()),
            library_root: "/lib".into(),
            library_name: "Shows".into(),
        };
        let mut index = TorrentIndex::new();
        for (hash, files) in entries {
            index.insert_torrent(torrent(hash), files, &mapping);
        }
        index
    }

    fn resolved(outcome: &MatchOutcome) -> Option<(&str, MatchStage)> {
        match outcome {
            MatchOutcome::Matched { torrent, stage } => Some((torrent.hash.as_str(), *stage)),
            _ => None,
        }
    }

    // =========================================================================
    // Exact path
    // =========================================================================

    #[test]
    fn test_exact_path_preferred_over_basename() {
        let index = index_of(&[
            ("OTHER", &[file("elsewhere/e1.mkv", 1000)]),
            ("H1", &[file("show/e1.mkv", 1000)]),
        ]);
        let items = vec![item("/lib/show/e1.mkv", 1000)];
        let tuning = MatchTuning::default();
        let matcher = TorrentMatcher::new(&index, &items, &tuning);

        assert_eq!(resolved(&matcher.resolve(&items[0])), Some(("H1", MatchStage::ExactPath)));
    }

    // =========================================================================
    // Basename
    // =========================================================================

    #[test]
    fn test_unique_basename_accepted() {
        let index = index_of(&[("H1", &[file("downloads/e1.mkv", 5)])]);
        let items = vec![item("/lib/show/e1.mkv", 1000)];
        let tuning = MatchTuning::default();
        let matcher = TorrentMatcher::new(&index, &items, &tuning);

        assert_eq!(resolved(&matcher.resolve(&items[0])), Some(("H1", MatchStage::Basename)));
    }

    #[test]
    fn test_basename_disambiguated_by_size() {
        let mib = 1024 * 1024;
        let index = index_of(&[
            ("FAR", &[file("a/e1.mkv", 50 * mib)]),
            ("NEAR", &[file("b/e1.mkv", 10 * mib + 1)]),
        ]);
        let items = vec![item("/lib/show/e1.mkv", (10 * mib) as i64)];
        let tuning = MatchTuning::default();
        let matcher = TorrentMatcher::new(&index, &items, &tuning);

        assert_eq!(matcher.match_basename(&items[0]).torrent().map(|t| t.hash.as_str()), Some("NEAR"));
    }

    #[test]
    fn test_basename_without_close_size_is_ambiguous() {
        let mib = 1024 * 1024;
        let index = index_of(&[
            ("A", &[file("a/e1.mkv", 50 * mib)]),
            ("B", &[file("b/e1.mkv", 12 * mib)]),
        ]);
        let items = vec![item("/lib/show/e1.mkv", (10 * mib) as i64), item("/lib/zero/e1.mkv", 0)];
        let tuning = MatchTuning::default();
        let matcher = TorrentMatcher::new(&index, &items, &tuning);

        assert!(matches!(matcher.match_basename(&items[0]), MatchOutcome::Ambiguous));
        assert!(matches!(matcher.match_basename(&items[1]), MatchOutcome::Ambiguous));
        assert!(matches!(matcher.resolve(&items[0]), MatchOutcome::NoMatch));
    }

    #[test]
    fn test_size_tolerance_is_strict() {
        let tolerance = MatchTuning::default().size_tolerance_bytes;
        let index = index_of(&[
            ("EDGE", &[file("a/e1.mkv", 1_000 + tolerance)]),
            ("OTHER", &[file("b/e1.mkv", 1_000 + 10 * tolerance)]),
        ]);
        let items = vec![item("/lib/show/e1.mkv", 1_000)];
        let tuning = MatchTuning::default();
        let matcher = TorrentMatcher::new(&index, &items, &tuning);

        assert!(matches!(matcher.match_basename(&items[0]), MatchOutcome::Ambiguous));
    }

    // =========================================================================
    // Path suffix
    // =========================================================================

    #[test]
    fn test_suffix_does_not_fall_back_to_client_paths() {
        let mib = 1024 * 1024;
        let index = index_of(&[("H1", &[file("x/a/e1.mkv", 50 * mib)]), ("H2", &[file("y/b/e1.mkv", 50 * mib)])]);
        let items = vec![item("/lib/a/e1.mkv", mib as i64)];
        let tuning = MatchTuning::default();
        let matcher = TorrentMatcher::new(&index, &items, &tuning);

        assert!(matches!(matcher.match_basename(&items[0]), MatchOutcome::Ambiguous));
        assert!(index.exact(&items[0].path).is_none());
        assert!(matches!(matcher.match_suffix(&items[0]), MatchOutcome::NoMatch));
        assert!(matches!(matcher.resolve(&items[0]), MatchOutcome::NoMatch));
    }

    #[test]
    fn test_suffix_owner_resolves_through_exact_path() {
        let index = index_of(&[("H1", &[file("show/S01/e1.mkv", 10)])]);
        let items = vec![item("/lib/show/S01/e1.mkv", 10)];
        let tuning = MatchTuning::default();
        let matcher = TorrentMatcher::new(&index, &items, &tuning);

        assert_eq!(resolved(&matcher.match_suffix(&items[0])), Some(("H1", MatchStage::PathSuffix)));
        assert_eq!(resolved(&matcher.resolve(&items[0])), Some(("H1", MatchStage::ExactPath)));
    }

    #[test]
    fn test_suffix_shared_by_two_items_never_matches() {
        let index = index_of(&[("H1", &[file("x/S01/e1.mkv", 10)]), ("H2", &[file("y/S01/e1.mkv", 10)])]);
        let items = vec![item("/lib/a/S01/e1.mkv", 10), item("/lib/b/S01/e1.mkv", 10)];
        let tuning = MatchTuning {
            size_tolerance_bytes: 0,
            suffix_depths: vec![2, 1],
        };
        let matcher = TorrentMatcher::new(&index, &items, &tuning);

        assert!(matches!(matcher.match_suffix(&items[0]), MatchOutcome::Ambiguous));
        assert!(matches!(matcher.resolve(&items[0]), MatchOutcome::NoMatch));
    }

    // =========================================================================
    // Attribution
    // =========================================================================

    #[test]
    fn test_reconcile_attribution_sets_and_detects_no_change() {
        let t = torrent("H1");
        let next = reconcile_attribution(&TorrentAttribution::default(), Some(&t)).unwrap();
        assert_eq!(
            next,
            TorrentAttribution {
                hash: Some("H1".into()),
                ratio: Some(2.0),
                seed_time_secs: Some(7200),
                seeders: Some(5),
                leechers: Some(1),
            }
        );
        assert_eq!(reconcile_attribution(&next, Some(&t)), None);
    }

    #[test]
    fn test_unreported_stats_keep_previous_values() {
        let current = TorrentAttribution {
            hash: Some("OLD".into()),
            ratio: Some(1.0),
            seed_time_secs: Some(10),
            seeders: Some(3),
            leechers: Some(0),
        };
        let t = TorrentInfo {
            hash: "NEW".into(),
            ..Default::default()
        };
        let next = reconcile_attribution(&current, Some(&t)).unwrap();
        assert_eq!(next.hash.as_deref(), Some("NEW"));
        assert_eq!(next.ratio, Some(1.0));
        assert_eq!(next.seeders, Some(3));
    }

    #[test]
    fn test_lost_match_clears_all_fields_once() {
        let current = TorrentAttribution {
            hash: Some("H1".into()),
            ..Default::default()
        };
        assert_eq!(reconcile_attribution(&current, None), Some(TorrentAttribution::default()));
        assert_eq!(reconcile_attribution(&TorrentAttribution::default(), None), None);
    }
}
