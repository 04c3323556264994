//! Local cache storage for compiler outputs.
//!
//! On-disk layout under the cache root:
//!
//! ```text
//! <root>/c/<key[0:2]>/<key[2:]>/.entry     committed build entry (metadata last)
//! <root>/c/<key[0:2]>/stats.json           hit/miss counters for the shard
//! <root>/m/<key[0:2]>/<key[2:]>/<n>.manifest  direct-mode include lists
//! <root>/d/<namespace>/<sha256>.json       scalar items with TTL
//! <root>/tmp/                              staging, trash and scratch files
//! ```
//!
//! The only cross-process primitive is `rename`: entries are staged in
//! `tmp/` and published with a single directory rename, and removed by
//! renaming them back into `tmp/` before deletion. Readers therefore see an
//! entry either completely or not at all.

pub mod data_store;
pub mod entry;
pub mod error;
pub mod fs_util;
pub mod housekeeping;
pub mod local_cache;
pub mod manifest;
pub mod stats;

pub use data_store::DataStore;
pub use entry::{CapturedOutput, Compression, EntryFile, EntryMetadata};
pub use error::{StoreError, StoreResult};
pub use fs_util::{FileInfo, LinkOutcome};
pub use housekeeping::{
    is_housekeeping_due, CacheUsage, EvictionPolicy, Housekeeper, HousekeepingResult,
};
pub use local_cache::{CommitOutcome, LocalCache};
pub use manifest::{DirectManifest, ManifestStore, MAX_MANIFEST_SLOTS};
pub use stats::CacheStats;
