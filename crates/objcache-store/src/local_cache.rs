//! Build entry store.
//!
//! Entries move through three states:
//! - Absent: no directory at the entry path
//! - Staging: a private directory under `tmp/`, invisible to readers
//! - Committed: published at `c/<key[0:2]>/<key[2:]>` by one `rename`
//!
//! With [`Compression::All`] every stored file is zstd-compressed and
//! decompressed again on fetch; compressed files are never hard-linked into
//! the build tree.
//!
//! A committed entry is never modified. Losing a publish race to another
//! process is success: both processes produced the same key, so the entry
//! that won is as good as ours.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::data_store::DataStore;
use crate::entry::{
    validate_key, validate_logical_name, CapturedOutput, Compression, EntryFile, EntryMetadata,
    METADATA_FILENAME, STDERR_FILENAME, STDOUT_FILENAME,
};
use crate::error::{StoreError, StoreResult};
use crate::fs_util::{
    compress_file, decompress_file, durable_copy, link_or_copy, sha256_file, touch,
    touch_best_effort,
};
use crate::manifest::ManifestStore;
use crate::stats::{self, CacheStats, StatsEvent};

/// Name prefix of staging directories under `tmp/`.
pub const STAGING_PREFIX: &str = ".stage-";

/// Name prefix of directories holding entries being deleted.
pub const TRASH_PREFIX: &str = ".trash-";

/// Result of a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// This process published the entry.
    Committed,
    /// An entry for the key was already present.
    AlreadyCached,
}

/// Local, file-system backed cache of build entries.
#[derive(Debug, Clone)]
pub struct LocalCache {
    root: PathBuf,
    compression: Compression,
}

impl LocalCache {
    /// Open (creating if needed) the cache rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("c"))?;
        fs::create_dir_all(root.join("tmp"))?;
        Ok(Self {
            root,
            compression: Compression::Off,
        })
    }

    /// Compress files stored by later commits.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the committed entry shards.
    pub fn entries_dir(&self) -> PathBuf {
        self.root.join("c")
    }

    /// Scratch directory for staging, trash and temporary files.
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Path of the entry directory for `key`.
    pub fn entry_dir(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.entries_dir().join(&key[..2]).join(&key[2..]))
    }

    /// Direct-mode manifests stored alongside the entries.
    pub fn manifests(&self) -> ManifestStore {
        ManifestStore::new(self.root.join("m"))
    }

    /// Scalar item store for `namespace`.
    pub fn data_store(&self, namespace: &str) -> StoreResult<DataStore> {
        DataStore::open(&self.root, namespace)
    }

    /// True if a committed entry exists for `key`.
    pub fn has(&self, key: &str) -> bool {
        self.entry_dir(key)
            .map(|dir| dir.join(METADATA_FILENAME).is_file())
            .unwrap_or(false)
    }

    /// Read the metadata of the entry for `key`.
    ///
    /// An entry with unreadable metadata is removed and reported absent.
    pub fn lookup(&self, key: &str) -> StoreResult<Option<EntryMetadata>> {
        let dir = self.entry_dir(key)?;
        let bytes = match fs::read(dir.join(METADATA_FILENAME)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        match serde_json::from_slice::<EntryMetadata>(&bytes) {
            Ok(meta) if meta.key == key => Ok(Some(meta)),
            Ok(meta) => {
                tracing::warn!(key, found = %meta.key, "entry metadata names another key, removing");
                self.remove_dir_via_trash(&dir)?;
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "corrupt entry metadata, removing");
                self.remove_dir_via_trash(&dir)?;
                Ok(None)
            }
        }
    }

    /// Store `files` (logical name to source path) and `output` under `key`.
    ///
    /// Files are compressed when compression is on. Otherwise they are
    /// hard-linked into the entry when `allow_hard_links` is set and the
    /// platform allows it, or copied.
    pub fn commit(
        &self,
        key: &str,
        files: &BTreeMap<String, PathBuf>,
        output: &CapturedOutput,
        allow_hard_links: bool,
    ) -> StoreResult<CommitOutcome> {
        let final_dir = self.entry_dir(key)?;
        if final_dir.join(METADATA_FILENAME).is_file() {
            return Ok(CommitOutcome::AlreadyCached);
        }
        for name in files.keys() {
            validate_logical_name(name)?;
        }

        // Removed on drop unless the rename below moves it away.
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(self.tmp_dir())?;

        let compressed = self.compression == Compression::All;
        let mut stored = BTreeMap::new();
        for (name, source) in files {
            let dest = staging.path().join(name);
            if compressed {
                compress_file(source, &dest)?;
            } else if allow_hard_links {
                link_or_copy(source, &dest)?;
            } else {
                fs::copy(source, &dest)?;
            }
            stored.insert(
                name.clone(),
                EntryFile {
                    size: fs::metadata(source)?.len(),
                    sha256: sha256_file(source)?,
                },
            );
        }
        fs::write(staging.path().join(STDOUT_FILENAME), &output.stdout)?;
        fs::write(staging.path().join(STDERR_FILENAME), &output.stderr)?;

        let mut meta = EntryMetadata::new(key, output.exit_code, stored);
        meta.compressed = compressed;
        fs::write(
            staging.path().join(METADATA_FILENAME),
            serde_json::to_vec_pretty(&meta)?,
        )?;

        if let Some(shard) = final_dir.parent() {
            fs::create_dir_all(shard)?;
        }
        match fs::rename(staging.path(), &final_dir) {
            Ok(()) => {
                tracing::debug!(key, files = files.len(), "committed cache entry");
                Ok(CommitOutcome::Committed)
            }
            Err(err) if final_dir.exists() => {
                tracing::debug!(key, error = %err, "entry published concurrently, discarding ours");
                Ok(CommitOutcome::AlreadyCached)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Materialize the entry for `key` at `targets` (logical name to path).
    ///
    /// Returns `None` if no entry exists. Every target is touched so build
    /// tools see a fresh timestamp. Compressed entries are always
    /// decompressed into fresh files, whatever `allow_hard_links` says.
    pub fn fetch(
        &self,
        key: &str,
        targets: &BTreeMap<String, PathBuf>,
        allow_hard_links: bool,
    ) -> StoreResult<Option<CapturedOutput>> {
        let Some(meta) = self.lookup(key)? else {
            return Ok(None);
        };
        let dir = self.entry_dir(key)?;

        for (name, target) in targets {
            if !meta.files.contains_key(name) {
                return Err(StoreError::MissingFile {
                    key: key.to_string(),
                    name: name.clone(),
                });
            }
            let source = dir.join(name);
            if meta.compressed {
                decompress_file(&source, target)?;
            } else if allow_hard_links {
                link_or_copy(&source, target)?;
            } else {
                durable_copy(&source, target)?;
            }
            touch(target)?;
        }

        let output = CapturedOutput {
            stdout: read_or_empty(&dir.join(STDOUT_FILENAME))?,
            stderr: read_or_empty(&dir.join(STDERR_FILENAME))?,
            exit_code: meta.exit_code,
        };
        touch_best_effort(&dir.join(METADATA_FILENAME));
        Ok(Some(output))
    }

    /// Remove the entry for `key`. Returns whether anything was removed.
    pub fn remove_entry(&self, key: &str) -> StoreResult<bool> {
        let dir = self.entry_dir(key)?;
        self.remove_dir_via_trash(&dir)
    }

    /// Remove a directory from the cache tree without exposing a partially
    /// deleted state: it is first renamed into `tmp/`, then deleted.
    pub(crate) fn remove_dir_via_trash(&self, dir: &Path) -> StoreResult<bool> {
        let trash = tempfile::Builder::new()
            .prefix(TRASH_PREFIX)
            .tempdir_in(self.tmp_dir())?;
        match fs::rename(dir, trash.path().join("victim")) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
        // `trash` drops here, deleting whatever was moved into it.
    }

    /// Count a hit for `key` (best effort).
    pub fn record_hit(&self, key: &str) {
        self.record(key, StatsEvent::Hit);
    }

    /// Count a miss for `key` (best effort).
    pub fn record_miss(&self, key: &str) {
        self.record(key, StatsEvent::Miss);
    }

    fn record(&self, key: &str, event: StatsEvent) {
        let Ok(dir) = self.entry_dir(key) else {
            return;
        };
        if let Some(shard) = dir.parent() {
            stats::record_best_effort(shard, event);
        }
    }

    /// Sum of the hit/miss counters of every shard.
    pub fn stats(&self) -> StoreResult<CacheStats> {
        stats::collect(&self.entries_dir())
    }

    /// Reset every shard's counters.
    pub fn zero_stats(&self) -> StoreResult<()> {
        stats::zero(&self.entries_dir())
    }
}

fn read_or_empty(path: &Path) -> io::Result<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KEY: &str = "ab0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcd";

    fn make_outputs(dir: &Path) -> BTreeMap<String, PathBuf> {
        let object = dir.join("main.o");
        fs::write(&object, b"\x7fELF object bytes").unwrap();
        let mut files = BTreeMap::new();
        files.insert("object".to_string(), object);
        files
    }

    fn make_output() -> CapturedOutput {
        CapturedOutput {
            stdout: b"note: compiled\n".to_vec(),
            stderr: b"warning: unused\n".to_vec(),
            exit_code: 0,
        }
    }

    #[test]
    fn test_absent_key() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::open(dir.path().join("cache")).unwrap();
        assert!(!cache.has(KEY));
        assert!(cache.lookup(KEY).unwrap().is_none());
        assert!(cache.fetch(KEY, &BTreeMap::new(), false).unwrap().is_none());
    }

    #[test]
    fn test_entry_layout_is_sharded() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::open(dir.path()).unwrap();
        let entry = cache.entry_dir(KEY).unwrap();
        assert!(entry.ends_with(Path::new("c").join("ab").join(&KEY[2..])));
        assert!(cache.entry_dir("Z").is_err());
    }

    #[test]
    fn test_commit_then_fetch_copy() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::open(dir.path().join("cache")).unwrap();
        let files = make_outputs(dir.path());

        let outcome = cache.commit(KEY, &files, &make_output(), false).unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);
        assert!(cache.has(KEY));

        let target = dir.path().join("restored.o");
        let mut targets = BTreeMap::new();
        targets.insert("object".to_string(), target.clone());
        let output = cache.fetch(KEY, &targets, false).unwrap().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"\x7fELF object bytes");
        assert_eq!(output, make_output());
    }

    #[test]
    fn test_commit_then_fetch_hard_link() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::open(dir.path().join("cache")).unwrap();
        let files = make_outputs(dir.path());
        cache.commit(KEY, &files, &make_output(), true).unwrap();

        let target = dir.path().join("linked.o");
        let mut targets = BTreeMap::new();
        targets.insert("object".to_string(), target.clone());
        cache.fetch(KEY, &targets, true).unwrap().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"\x7fELF object bytes");
    }

    #[test]
    fn test_second_commit_is_noop() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::open(dir.path().join("cache")).unwrap();
        let files = make_outputs(dir.path());

        cache.commit(KEY, &files, &make_output(), false).unwrap();
        let other = CapturedOutput {
            stdout: b"different".to_vec(),
            ..make_output()
        };
        let outcome = cache.commit(KEY, &files, &other, false).unwrap();
        assert_eq!(outcome, CommitOutcome::AlreadyCached);

        let output = cache.fetch(KEY, &BTreeMap::new(), false).unwrap().unwrap();
        assert_eq!(output.stdout, make_output().stdout);
    }

    #[test]
    fn test_staging_cleaned_up_on_failure() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::open(dir.path().join("cache")).unwrap();
        let mut files = BTreeMap::new();
        files.insert("object".to_string(), dir.path().join("never-built.o"));

        assert!(cache.commit(KEY, &files, &make_output(), false).is_err());
        assert!(!cache.has(KEY));
        assert_eq!(fs::read_dir(cache.tmp_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_invalid_logical_name_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::open(dir.path().join("cache")).unwrap();
        let mut files = make_outputs(dir.path());
        let object = files.remove("object").unwrap();
        files.insert("../object".to_string(), object);

        assert!(matches!(
            cache.commit(KEY, &files, &make_output(), false),
            Err(StoreError::InvalidName(_))
        ));
    }

    #[test]
    fn test_fetch_unknown_logical_name() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::open(dir.path().join("cache")).unwrap();
        cache
            .commit(KEY, &make_outputs(dir.path()), &make_output(), false)
            .unwrap();

        let mut targets = BTreeMap::new();
        targets.insert("coverage".to_string(), dir.path().join("main.gcno"));
        let err = cache.fetch(KEY, &targets, false).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_corrupt_metadata_removes_entry() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::open(dir.path().join("cache")).unwrap();
        cache
            .commit(KEY, &make_outputs(dir.path()), &make_output(), false)
            .unwrap();
        let meta_path = cache.entry_dir(KEY).unwrap().join(METADATA_FILENAME);
        fs::write(&meta_path, b"garbage").unwrap();

        assert!(cache.lookup(KEY).unwrap().is_none());
        assert!(!cache.entry_dir(KEY).unwrap().exists());
    }

    #[test]
    fn test_remove_entry() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::open(dir.path().join("cache")).unwrap();
        cache
            .commit(KEY, &make_outputs(dir.path()), &make_output(), false)
            .unwrap();

        assert!(cache.remove_entry(KEY).unwrap());
        assert!(!cache.has(KEY));
        assert!(!cache.remove_entry(KEY).unwrap());
        assert_eq!(fs::read_dir(cache.tmp_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_hit_and_miss_counters() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::open(dir.path().join("cache")).unwrap();

        cache.record_miss(KEY);
        cache.record_hit(KEY);
        cache.record_hit(KEY);

        let stats = cache.stats().unwrap();
        assert_eq!(stats.local_hits, 2);
        assert_eq!(stats.local_misses, 1);

        cache.zero_stats().unwrap();
        assert_eq!(cache.stats().unwrap(), CacheStats::default());
    }

    #[test]
    fn test_compressed_commit_then_fetch() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::open(dir.path().join("cache"))
            .unwrap()
            .with_compression(Compression::All);
        let object = dir.path().join("main.o");
        let contents = b"\x7fELF repeated section ".repeat(1024);
        fs::write(&object, &contents).unwrap();
        let mut files = BTreeMap::new();
        files.insert("object".to_string(), object);

        cache.commit(KEY, &files, &make_output(), true).unwrap();
        let meta = cache.lookup(KEY).unwrap().unwrap();
        assert!(meta.compressed);
        assert_eq!(meta.total_size(), contents.len() as u64);
        let stored = fs::read(cache.entry_dir(KEY).unwrap().join("object")).unwrap();
        assert!(stored.len() < contents.len());

        let target = dir.path().join("restored.o");
        let mut targets = BTreeMap::new();
        targets.insert("object".to_string(), target.clone());
        let output = cache.fetch(KEY, &targets, true).unwrap().unwrap();

        assert_eq!(fs::read(&target).unwrap(), contents);
        assert_eq!(output, make_output());
        fs::write(&target, b"edited").unwrap();
        let stored_after = fs::read(cache.entry_dir(KEY).unwrap().join("object")).unwrap();
        assert_eq!(stored_after, stored);
    }

    #[test]
    fn test_uncompressed_entry_readable_with_compression_on() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        LocalCache::open(&root)
            .unwrap()
            .commit(KEY, &make_outputs(dir.path()), &make_output(), false)
            .unwrap();

        let cache = LocalCache::open(&root)
            .unwrap()
            .with_compression(Compression::All);
        let target = dir.path().join("restored.o");
        let mut targets = BTreeMap::new();
        targets.insert("object".to_string(), target.clone());
        cache.fetch(KEY, &targets, false).unwrap().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"\x7fELF object bytes");
    }

    #[test]
    fn test_concurrent_commits_of_one_key() {
        const THREADS: usize = 8;
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::open(dir.path().join("cache")).unwrap();
        let contents: Vec<u8> = (0..4 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();

        let outcomes: Vec<CommitOutcome> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|n| {
                    let cache = &cache;
                    let contents = &contents;
                    let work = dir.path().join(format!("worker{}", n));
                    scope.spawn(move || {
                        fs::create_dir_all(&work).unwrap();
                        let object = work.join("main.o");
                        fs::write(&object, contents).unwrap();
                        let mut files = BTreeMap::new();
                        files.insert("object".to_string(), object);
                        let outcome = cache.commit(KEY, &files, &make_output(), false).unwrap();

                        let target = work.join("restored.o");
                        let mut targets = BTreeMap::new();
                        targets.insert("object".to_string(), target.clone());
                        let output = cache.fetch(KEY, &targets, false).unwrap().unwrap();
                        assert_eq!(output, make_output());
                        assert!(fs::read(&target).unwrap() == *contents);
                        outcome
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let committed = outcomes
            .iter()
            .filter(|o| **o == CommitOutcome::Committed)
            .count();
        assert_eq!(committed, 1);
        assert_eq!(outcomes.len() - committed, THREADS - 1);
        assert_eq!(fs::read_dir(cache.tmp_dir()).unwrap().count(), 0);
    }
}
