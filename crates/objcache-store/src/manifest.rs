//! Direct-mode manifests.
//!
//! A manifest maps a direct lookup key (compiler identity, arguments and
//! source contents, but no headers) to the list of headers a previous
//! compilation read. Re-hashing those headers yields the full cache key
//! without running the preprocessor. One direct key can have several
//! manifests, one per distinct header list seen, up to
//! [`MAX_MANIFEST_SLOTS`]; the least recently used slot is overwritten when
//! full. A slot's modification time is its last use.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::validate_key;
use crate::error::StoreResult;
use crate::fs_util::{atomic_write, touch_best_effort};

/// Number of header lists kept per direct lookup key.
pub const MAX_MANIFEST_SLOTS: usize = 4;

const MANIFEST_EXTENSION: &str = "manifest";

/// One recorded header list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectManifest {
    pub direct_key: String,
    pub created_at: DateTime<Utc>,
    /// Canonical paths of the headers read by the compilation, sorted.
    pub implicit_inputs: Vec<PathBuf>,
    /// Slot the manifest was loaded from.
    #[serde(skip)]
    pub slot: usize,
    /// Last time the slot was written or produced a hit.
    #[serde(skip, default = "never_used")]
    pub last_used: SystemTime,
}

fn never_used() -> SystemTime {
    SystemTime::UNIX_EPOCH
}

/// Manifest storage rooted at `<cache root>/m`.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    root: PathBuf,
}

impl ManifestStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_dir(&self, direct_key: &str) -> StoreResult<PathBuf> {
        validate_key(direct_key)?;
        Ok(self.root.join(&direct_key[..2]).join(&direct_key[2..]))
    }

    fn slot_path(dir: &Path, slot: usize) -> PathBuf {
        dir.join(format!("{}.{}", slot, MANIFEST_EXTENSION))
    }

    /// Load every readable manifest for `direct_key`, most recently used
    /// first.
    pub fn load(&self, direct_key: &str) -> StoreResult<Vec<DirectManifest>> {
        let dir = self.key_dir(direct_key)?;
        let mut manifests = Vec::new();

        for slot in 0..MAX_MANIFEST_SLOTS {
            let path = Self::slot_path(&dir, slot);
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            match serde_json::from_slice::<DirectManifest>(&bytes) {
                Ok(mut manifest) if manifest.direct_key == direct_key => {
                    manifest.slot = slot;
                    manifest.last_used = fs::metadata(&path)
                        .and_then(|m| m.modified())
                        .unwrap_or_else(|_| never_used());
                    manifests.push(manifest);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "ignoring corrupt manifest");
                }
            }
        }

        manifests.sort_by(|a, b| {
            b.last_used
                .cmp(&a.last_used)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(manifests)
    }

    /// Record that a compilation under `direct_key` read `implicit_inputs`.
    ///
    /// Recording a list that is already stored only refreshes it.
    pub fn record(&self, direct_key: &str, implicit_inputs: &[PathBuf]) -> StoreResult<()> {
        let dir = self.key_dir(direct_key)?;
        let mut inputs = implicit_inputs.to_vec();
        inputs.sort();
        inputs.dedup();

        let existing = self.load(direct_key)?;
        if let Some(same) = existing.iter().find(|m| m.implicit_inputs == inputs) {
            self.touch(direct_key, same.slot);
            return Ok(());
        }

        let slot = (0..MAX_MANIFEST_SLOTS)
            .find(|slot| !existing.iter().any(|m| m.slot == *slot))
            .or_else(|| existing.last().map(|least_used| least_used.slot))
            .unwrap_or(0);

        let manifest = DirectManifest {
            direct_key: direct_key.to_string(),
            created_at: Utc::now(),
            implicit_inputs: inputs,
            slot,
            last_used: SystemTime::now(),
        };
        atomic_write(&Self::slot_path(&dir, slot), &serde_json::to_vec_pretty(&manifest)?)?;
        tracing::debug!(direct_key, slot, "recorded direct-mode manifest");
        Ok(())
    }

    /// Mark a manifest slot as recently used.
    pub fn touch(&self, direct_key: &str, slot: usize) {
        if let Ok(dir) = self.key_dir(direct_key) {
            touch_best_effort(&Self::slot_path(&dir, slot));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const DIRECT_KEY: &str = "cd00112233445566778899aabbccddeeff00112233445566778899aabbccddee";

    fn headers(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from(format!("/usr/include/{}", n))).collect()
    }

    #[test]
    fn test_empty_load() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        assert!(store.load(DIRECT_KEY).unwrap().is_empty());
    }

    #[test]
    fn test_record_and_load() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());

        store.record(DIRECT_KEY, &headers(&["stdio.h", "a.h", "a.h"])).unwrap();
        let loaded = store.load(DIRECT_KEY).unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].implicit_inputs, headers(&["a.h", "stdio.h"]));
    }

    #[test]
    fn test_duplicate_list_not_stored_twice() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());

        store.record(DIRECT_KEY, &headers(&["a.h"])).unwrap();
        store.record(DIRECT_KEY, &headers(&["a.h"])).unwrap();
        assert_eq!(store.load(DIRECT_KEY).unwrap().len(), 1);
    }

    #[test]
    fn test_slots_are_bounded() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());

        for i in 0..MAX_MANIFEST_SLOTS + 2 {
            store
                .record(DIRECT_KEY, &headers(&[format!("h{}.h", i).as_str()]))
                .unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let loaded = store.load(DIRECT_KEY).unwrap();
        assert_eq!(loaded.len(), MAX_MANIFEST_SLOTS);
        let newest = format!("h{}.h", MAX_MANIFEST_SLOTS + 1);
        assert!(loaded[0].implicit_inputs[0].ends_with(&newest));
        assert!(!loaded
            .iter()
            .any(|m| m.implicit_inputs[0].ends_with("h0.h")));
    }

    #[test]
    fn test_hit_slot_survives_replacement() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());
        for i in 0..MAX_MANIFEST_SLOTS {
            store
                .record(DIRECT_KEY, &headers(&[format!("h{}.h", i).as_str()]))
                .unwrap();
        }
        let key_dir = store.key_dir(DIRECT_KEY).unwrap();
        for slot in 0..MAX_MANIFEST_SLOTS {
            let when = SystemTime::now() - Duration::from_secs(1000 - slot as u64 * 10);
            fs::File::options()
                .write(true)
                .open(ManifestStore::slot_path(&key_dir, slot))
                .unwrap()
                .set_modified(when)
                .unwrap();
        }

        // h0.h was written first but just produced a hit.
        store.touch(DIRECT_KEY, 0);
        store.record(DIRECT_KEY, &headers(&["new.h"])).unwrap();

        let loaded = store.load(DIRECT_KEY).unwrap();
        assert_eq!(loaded.len(), MAX_MANIFEST_SLOTS);
        let has = |name: &str| loaded.iter().any(|m| m.implicit_inputs[0].ends_with(name));
        assert!(has("h0.h"));
        assert!(has("new.h"));
        assert!(!has("h1.h"));
    }
}
