//! Cache eviction and cleanup.
//!
//! - Size-based eviction: least recently used entries and manifests are
//!   removed until the cache fits under the configured size
//! - Orphan cleanup: staging, trash and scratch files left in `tmp/` by
//!   crashed processes are removed once they are old enough
//! - Eviction only ever removes a whole entry, via a rename into `tmp/`
//!   first, so concurrent readers never see half an entry

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::StoreResult;
use crate::fs_util::walk_files;
use crate::local_cache::LocalCache;

/// Roughly one commit in this many triggers housekeeping.
pub const HOUSEKEEPING_INTERVAL: u32 = 100;

/// Eviction policy configuration.
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
    /// Maximum total cache size in bytes (0 = unlimited)
    pub max_size_bytes: u64,
    /// Age after which leftovers in `tmp/` are deleted
    pub orphan_age: Duration,
    /// Whether to dry-run (log but don't delete)
    pub dry_run: bool,
}

fn default_orphan_age() -> Duration {
    Duration::from_secs(3600)
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: 5 * 1024 * 1024 * 1024,
            orphan_age: default_orphan_age(),
            dry_run: false,
        }
    }
}

impl EvictionPolicy {
    /// Create a size-based eviction policy.
    pub fn size_based(max_size_bytes: u64) -> Self {
        Self {
            max_size_bytes,
            ..Self::default()
        }
    }

    /// Set dry-run mode.
    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Result of a housekeeping run.
#[derive(Debug, Clone, Default)]
pub struct HousekeepingResult {
    /// Entries and manifests scanned
    pub scanned: usize,
    /// Entries and manifests removed
    pub evicted: usize,
    /// Total size before eviction
    pub bytes_before: u64,
    /// Total size after eviction
    pub bytes_after: u64,
    /// Leftovers removed from `tmp/`
    pub orphans_removed: usize,
    /// Errors encountered (non-fatal)
    pub errors: Vec<String>,
}

impl HousekeepingResult {
    pub fn bytes_reclaimed(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

#[derive(Debug, Clone)]
struct CachedItem {
    path: PathBuf,
    size: u64,
    last_used: SystemTime,
}

/// Size of the cache as seen by housekeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheUsage {
    /// Committed build entries
    pub entries: usize,
    /// Direct-mode manifest directories
    pub manifests: usize,
    /// Bytes held by entries and manifests
    pub bytes: u64,
}

/// Runs eviction and cleanup over a [`LocalCache`].
pub struct Housekeeper<'a> {
    cache: &'a LocalCache,
    policy: EvictionPolicy,
}

impl<'a> Housekeeper<'a> {
    pub fn new(cache: &'a LocalCache, policy: EvictionPolicy) -> Self {
        Self { cache, policy }
    }

    /// Remove orphans, then evict least recently used items until the cache
    /// is under the size limit.
    pub fn run(&self) -> StoreResult<HousekeepingResult> {
        let mut result = HousekeepingResult::default();
        self.cleanup_orphans(&mut result)?;

        let mut items = self.scan()?;
        result.scanned = items.len();
        result.bytes_before = items.iter().map(|i| i.size).sum();
        result.bytes_after = result.bytes_before;

        if self.policy.max_size_bytes == 0 || result.bytes_after <= self.policy.max_size_bytes {
            return Ok(result);
        }

        items.sort_by(|a, b| a.last_used.cmp(&b.last_used));
        for item in &items {
            if result.bytes_after <= self.policy.max_size_bytes {
                break;
            }
            if self.policy.dry_run {
                tracing::info!(path = %item.path.display(), size = item.size, "would evict");
                result.bytes_after -= item.size;
                result.evicted += 1;
                continue;
            }
            match self.cache.remove_dir_via_trash(&item.path) {
                Ok(_) => {
                    result.bytes_after -= item.size;
                    result.evicted += 1;
                }
                Err(err) => result
                    .errors
                    .push(format!("{}: {}", item.path.display(), err)),
            }
        }

        tracing::debug!(
            evicted = result.evicted,
            reclaimed = result.bytes_reclaimed(),
            "housekeeping finished"
        );
        Ok(result)
    }

    /// Remove every entry and manifest. Returns the number removed.
    pub fn clear(&self) -> StoreResult<usize> {
        let mut removed = 0;
        for item in self.scan()? {
            if self.cache.remove_dir_via_trash(&item.path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Count entries and manifests and sum their sizes.
    pub fn usage(&self) -> StoreResult<CacheUsage> {
        let entries_dir = self.cache.entries_dir();
        let mut usage = CacheUsage::default();
        for item in self.scan()? {
            if item.path.starts_with(&entries_dir) {
                usage.entries += 1;
            } else {
                usage.manifests += 1;
            }
            usage.bytes += item.size;
        }
        Ok(usage)
    }

    /// Collect every entry and manifest directory.
    fn scan(&self) -> StoreResult<Vec<CachedItem>> {
        let mut items = Vec::new();
        for tree in [self.cache.entries_dir(), self.cache.manifests().root().to_path_buf()] {
            for dir in item_dirs(&tree)? {
                let files = walk_files(&dir, |_| true)?;
                let last_used = files
                    .iter()
                    .map(|f| f.modified)
                    .max()
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                items.push(CachedItem {
                    size: files.iter().map(|f| f.size).sum(),
                    path: dir,
                    last_used,
                });
            }
        }
        Ok(items)
    }

    fn cleanup_orphans(&self, result: &mut HousekeepingResult) -> StoreResult<()> {
        let tmp = self.cache.tmp_dir();
        if !tmp.exists() {
            return Ok(());
        }

        for entry in fs::read_dir(&tmp)? {
            let path = entry?.path();
            let age = fs::symlink_metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| modified.elapsed().ok());
            match age {
                Some(age) if age > self.policy.orphan_age => {}
                _ => continue,
            }

            if self.policy.dry_run {
                result.orphans_removed += 1;
                continue;
            }
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match removed {
                Ok(()) => result.orphans_removed += 1,
                Err(err) => result.errors.push(format!("{}: {}", path.display(), err)),
            }
        }
        Ok(())
    }
}

/// Two-level shard walk: `<tree>/<2 hex>/<rest>/`.
fn item_dirs(tree: &Path) -> StoreResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    if !tree.exists() {
        return Ok(dirs);
    }
    for shard in fs::read_dir(tree)? {
        let shard = shard?.path();
        if !shard.is_dir() {
            continue;
        }
        for item in fs::read_dir(&shard)? {
            let item = item?.path();
            if item.is_dir() {
                dirs.push(item);
            }
        }
    }
    Ok(dirs)
}

/// Whether this process should run housekeeping after a commit.
///
/// Spreads the cost over roughly one commit in [`HOUSEKEEPING_INTERVAL`]
/// without any shared state between processes.
pub fn is_housekeeping_due() -> bool {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() / 1000 % HOUSEKEEPING_INTERVAL == 0)
        .unwrap_or(false)
}
