//! Content hashing.
//!
//! SHA-256 over bytes and files, streamed in fixed-size chunks so large
//! preprocessed outputs and object files never need to fit in memory.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Length of a rendered digest in hex characters.
pub const DIGEST_HEX_LEN: usize = 64;

/// A content digest, rendered as lowercase hex.
///
/// Used both as the opaque cache key and for comparing file contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an existing hex digest, rejecting anything that is not one.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let valid = hex.len() == DIGEST_HEX_LEN
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| CacheKey(hex.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental SHA-256 hasher.
#[derive(Debug, Clone, Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    /// Feed the contents of the file at `path`.
    pub fn update_file(&mut self, path: &Path) -> io::Result<()> {
        let mut file = File::open(path)?;
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                return Ok(());
            }
            self.inner.update(&buffer[..n]);
        }
    }

    pub fn finalize(self) -> CacheKey {
        CacheKey(hex::encode(self.inner.finalize()))
    }
}

/// Digest of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> CacheKey {
    let mut hasher = ContentHasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Digest of the contents of the file at `path`.
pub fn hash_file(path: &Path) -> io::Result<CacheKey> {
    let mut hasher = ContentHasher::new();
    hasher.update_file(path)?;
    Ok(hasher.finalize())
}
