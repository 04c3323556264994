//! Committed build entry metadata.
//!
//! An entry directory holds one file per logical output name, the captured
//! compiler streams, and a metadata record written last.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Schema identifier for entry metadata.
pub const ENTRY_SCHEMA_ID: &str = "objcache/entry@1";

/// Metadata record; its presence marks the entry as committed.
pub const METADATA_FILENAME: &str = ".entry";

/// Captured compiler standard output.
pub const STDOUT_FILENAME: &str = ".stdout";

/// Captured compiler standard error.
pub const STDERR_FILENAME: &str = ".stderr";

/// Whether entry files are stored compressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Off,
    /// Every stored output file is zstd-compressed.
    All,
}

/// Output of a compiler run, as recorded with an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

/// One stored output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFile {
    /// Size in bytes.
    pub size: u64,
    /// SHA-256 of the contents.
    pub sha256: String,
}

/// Metadata record of a committed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub schema_id: String,

    /// Cache key the entry was committed under.
    pub key: String,

    pub created_at: DateTime<Utc>,

    /// Exit code of the compiler run that produced the entry.
    pub exit_code: i32,

    /// Stored files by logical name.
    pub files: BTreeMap<String, EntryFile>,

    /// Files are stored zstd-compressed; sizes and digests describe the
    /// uncompressed contents.
    #[serde(default)]
    pub compressed: bool,
}

impl EntryMetadata {
    pub fn new(key: &str, exit_code: i32, files: BTreeMap<String, EntryFile>) -> Self {
        Self {
            schema_id: ENTRY_SCHEMA_ID.to_string(),
            key: key.to_string(),
            created_at: Utc::now(),
            exit_code,
            files,
            compressed: false,
        }
    }

    /// Total size of the stored output files.
    pub fn total_size(&self) -> u64 {
        self.files.values().map(|f| f.size).sum()
    }
}

/// Check that a logical name can be used as a file name inside an entry.
///
/// Names must be non-empty, must not start with `.` (reserved for the
/// entry's own records) and must not contain path separators.
pub fn validate_logical_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(|c: char| matches!(c, '/' | '\\' | ':' | '\0'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

/// Check that `key` is a lowercase hex digest long enough to shard.
pub fn validate_key(key: &str) -> StoreResult<()> {
    let valid = key.len() > 2
        && key
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
