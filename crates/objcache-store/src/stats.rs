//! Hit/miss counters.
//!
//! Each shard directory (`c/<2 hex>/`) carries its own `stats.json`, which
//! spreads concurrent updates over 256 files. Updates are read-modify-write
//! with an atomic replace and no lock, so two processes updating the same
//! shard at the same instant can lose one increment. The counters are
//! informational and that loss is accepted.

use std::fs;
use std::io;
use std::ops::AddAssign;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::fs_util::{atomic_write, remove_if_exists};

/// Name of the per-shard counters file.
pub const STATS_FILENAME: &str = "stats.json";

/// Counted cache events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsEvent {
    Hit,
    Miss,
}

/// Cache effectiveness counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    #[serde(default)]
    pub local_hits: u64,
    #[serde(default)]
    pub local_misses: u64,
}

impl CacheStats {
    /// Total lookups counted.
    pub fn lookups(&self) -> u64 {
        self.local_hits + self.local_misses
    }

    /// Hit ratio in percent, if anything was looked up.
    pub fn hit_ratio_percent(&self) -> Option<f64> {
        match self.lookups() {
            0 => None,
            total => Some(self.local_hits as f64 * 100.0 / total as f64),
        }
    }
}

impl AddAssign for CacheStats {
    fn add_assign(&mut self, other: Self) {
        self.local_hits += other.local_hits;
        self.local_misses += other.local_misses;
    }
}

fn read_shard(path: &Path) -> CacheStats {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(path = %path.display(), error = %err, "failed to read stats");
            }
            CacheStats::default()
        }
    }
}

fn record(shard: &Path, event: StatsEvent) -> StoreResult<()> {
    let path = shard.join(STATS_FILENAME);
    let mut stats = read_shard(&path);
    match event {
        StatsEvent::Hit => stats.local_hits += 1,
        StatsEvent::Miss => stats.local_misses += 1,
    }
    atomic_write(&path, &serde_json::to_vec(&stats)?)?;
    Ok(())
}

/// Count `event` in `shard`, logging instead of failing.
pub fn record_best_effort(shard: &Path, event: StatsEvent) {
    if let Err(err) = record(shard, event) {
        tracing::debug!(shard = %shard.display(), error = %err, "failed to update stats");
    }
}

/// Sum the counters of every shard under `entries_dir`.
pub fn collect(entries_dir: &Path) -> StoreResult<CacheStats> {
    let mut total = CacheStats::default();
    if !entries_dir.exists() {
        return Ok(total);
    }
    for shard in fs::read_dir(entries_dir)? {
        let shard = shard?.path();
        if shard.is_dir() {
            total += read_shard(&shard.join(STATS_FILENAME));
        }
    }
    Ok(total)
}

/// Delete every shard's counters file.
pub fn zero(entries_dir: &Path) -> StoreResult<()> {
    if !entries_dir.exists() {
        return Ok(());
    }
    for shard in fs::read_dir(entries_dir)? {
        let shard = shard?.path();
        if shard.is_dir() {
            remove_if_exists(&shard.join(STATS_FILENAME))?;
        }
    }
    Ok(())
}
