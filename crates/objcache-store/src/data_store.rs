//! Scalar key/value items with an optional time-to-live.
//!
//! Used for small memoized facts, such as whether a generic `cc` binary is
//! really a GCC-compatible compiler. Each item is one JSON file named by the
//! SHA-256 of its key, written atomically, so concurrent writers simply race
//! to the last rename and readers never need a lock.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StoreResult;
use crate::fs_util::{atomic_write, remove_file_best_effort};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredItem {
    key: String,
    value: String,
    stored_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ttl_ms: Option<u64>,
}

impl StoredItem {
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_ms {
            Some(ttl_ms) => {
                let age_ms = now.signed_duration_since(self.stored_at).num_milliseconds();
                age_ms < 0 || age_ms as u64 >= ttl_ms
            }
            None => false,
        }
    }
}

/// Namespaced scalar store rooted at `<cache root>/d/<namespace>`.
#[derive(Debug, Clone)]
pub struct DataStore {
    dir: PathBuf,
}

impl DataStore {
    /// Open (creating if needed) the `namespace` store under `root`.
    pub fn open(root: impl AsRef<Path>, namespace: &str) -> StoreResult<Self> {
        let dir = root.as_ref().join("d").join(namespace);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn item_path(&self, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.dir.join(format!("{}.json", digest))
    }

    /// Read `key`, treating expired items as absent.
    pub fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.get_at(key, Utc::now())
    }

    /// Read `key` as of `now`.
    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> StoreResult<Option<String>> {
        let path = self.item_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let item: StoredItem = match serde_json::from_slice(&bytes) {
            Ok(item) => item,
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "discarding corrupt data item");
                remove_file_best_effort(&path);
                return Ok(None);
            }
        };

        if item.key != key {
            return Ok(None);
        }
        if item.is_expired_at(now) {
            remove_file_best_effort(&path);
            return Ok(None);
        }
        Ok(Some(item.value))
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// With `ttl` set the item reads as absent once `ttl` has elapsed.
    pub fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.put_at(key, value, ttl, Utc::now())
    }

    /// Store `value` as if written at `now`.
    pub fn put_at(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let item = StoredItem {
            key: key.to_string(),
            value: value.to_string(),
            stored_at: now,
            ttl_ms: ttl.map(|d| d.as_millis() as u64),
        };
        atomic_write(&self.item_path(key), &serde_json::to_vec(&item)?)?;
        Ok(())
    }

    /// Remove `key` if present.
    pub fn remove(&self, key: &str) -> StoreResult<()> {
        crate::fs_util::remove_if_exists(&self.item_path(key))?;
        Ok(())
    }
}
