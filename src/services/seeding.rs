//! Seeding requirement checks
//!
//! A library can ask that torrents keep seeding for a minimum time, reach a
//! minimum ratio, or keep a minimum number of seeders before their media is
//! removed.

use serde::Serialize;

use crate::db::{LibraryRecord, TorrentAttribution};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeedingRequirements {
    pub min_seed_time_minutes: i64,
    pub min_seed_ratio: f64,
    pub min_seeders: i64,
}

/// Result of checking one item against a library's requirements
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeedingEvaluation {
    pub satisfied: bool,
    pub unmet: Vec<String>,
}

impl SeedingRequirements {
    pub fn from_library(library: &LibraryRecord) -> Self {
        Self {
            min_seed_time_minutes: library.min_seed_time_minutes,
            min_seed_ratio: library.min_seed_ratio,
            min_seeders: library.min_seeders,
        }
    }

    /// Whether any threshold is set at all
    pub fn is_active(&self) -> bool {
        self.min_seed_time_minutes > 0 || self.min_seed_ratio > 0.0 || self.min_seeders > 0
    }

    pub fn evaluate(&self, attribution: &TorrentAttribution) -> SeedingEvaluation {
        if attribution.hash.is_none() {
            return SeedingEvaluation {
                satisfied: false,
                unmet: vec!["no torrent attribution".to_string()],
            };
        }

        let mut unmet = Vec::new();

        if self.min_seed_time_minutes > 0 {
            let minutes = attribution.seed_time_secs.unwrap_or(0) / 60;
            if minutes < self.min_seed_time_minutes {
                unmet.push(format!(
                    "seed time {}m below minimum {}m",
                    minutes, self.min_seed_time_minutes
                ));
            }
        }

        if self.min_seed_ratio > 0.0 {
            let ratio = attribution.ratio.unwrap_or(0.0);
            if ratio < self.min_seed_ratio {
                unmet.push(format!("ratio {:.2} below minimum {:.2}", ratio, self.min_seed_ratio));
            }
        }

        if self.min_seeders > 0 {
            let seeders = attribution.seeders.unwrap_or(0);
            if seeders < self.min_seeders {
                unmet.push(format!("{} seeders below minimum {}", seeders, self.min_seeders));
            }
        }

        SeedingEvaluation {
            satisfied: unmet.is_empty(),
            unmet,
        }
    }
}
