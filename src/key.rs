//! Cache key derivation.
//!
//! Every field is fed as `tag NUL length contents`, so no two different
//! field sequences can produce the same byte stream. Fields, in order:
//! 1. the hash-format version
//! 2. the program identity
//! 3. the relevant arguments
//! 4. the relevant environment variables, sorted by name
//! 5. a mode tag followed by either the preprocessed text or the digests of
//!    the input files and implicit inputs

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use crate::hasher::{hash_file, CacheKey, ContentHasher};

/// Bumped whenever the key layout changes, invalidating every old entry.
pub const HASH_FORMAT_VERSION: &str = "objcache-key-1";

/// Accumulates the invocation-level fields of a cache key.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    hasher: ContentHasher,
}

impl CacheKeyBuilder {
    /// Start a key from the fields shared by every mode.
    pub fn new(program_id: &str, args: &[String], env: &BTreeMap<String, String>) -> Self {
        let mut builder = Self {
            hasher: ContentHasher::new(),
        };
        builder.field("version", HASH_FORMAT_VERSION.as_bytes());
        builder.field("program", program_id.as_bytes());
        builder.field("argc", &(args.len() as u64).to_le_bytes());
        for arg in args {
            builder.field("arg", arg.as_bytes());
        }
        for (name, value) in env {
            builder.field("env-name", name.as_bytes());
            builder.field("env-value", value.as_bytes());
        }
        builder
    }

    fn field(&mut self, tag: &str, contents: &[u8]) {
        self.hasher.update(tag.as_bytes());
        self.hasher.update(&[0]);
        self.hasher.update(&(contents.len() as u64).to_le_bytes());
        self.hasher.update(contents);
    }

    fn files(&mut self, tag: &str, paths: &[PathBuf]) -> io::Result<()> {
        self.field(tag, &(paths.len() as u64).to_le_bytes());
        for path in paths {
            let digest = hash_file(path)?;
            self.field(tag, digest.as_str().as_bytes());
        }
        Ok(())
    }

    /// Key of a preprocess-mode compilation.
    pub fn preprocessed(mut self, text: &[u8]) -> CacheKey {
        self.field("mode", b"preprocessed");
        self.field("text", text);
        self.hasher.finalize()
    }

    /// Key of a direct-mode compilation: source contents plus the contents of
    /// every header it read.
    pub fn direct(mut self, inputs: &[PathBuf], implicit: &[PathBuf]) -> io::Result<CacheKey> {
        self.field("mode", b"direct");
        self.files("input", inputs)?;
        self.files("implicit", implicit)?;
        Ok(self.hasher.finalize())
    }

    /// Key under which direct-mode manifests are stored: everything known
    /// before the preprocessor runs.
    pub fn direct_lookup(mut self, inputs: &[PathBuf]) -> io::Result<CacheKey> {
        self.field("mode", b"direct-lookup");
        self.files("input", inputs)?;
        Ok(self.hasher.finalize())
    }
}
