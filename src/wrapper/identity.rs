//! Identity checks for generic compiler names.
//!
//! `cc` and `c++` may be hard links or copies of any compiler. They count as
//! GCC-compatible when they are the same file as a `gcc`/`clang` binary next
//! to them.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use objcache_store::fs_util::file_info;
use objcache_store::DataStore;

use crate::exe_path::ExecutablePath;
use crate::hasher::hash_file;

/// How long a memoized identity answer stays valid.
pub const IDENTITY_TTL: Duration = Duration::from_secs(30);

const GCC_ALTERNATIVES: &[&str] = &["clang", "gcc", "clang++", "g++"];

/// Whether `path` is the same file as, or byte-identical to, one of
/// `alternatives`.
///
/// Size and inode are compared first; contents are hashed only when those
/// are inconclusive. Alternatives that do not exist are skipped.
pub fn is_file_identical_to(path: &Path, alternatives: &[PathBuf]) -> io::Result<bool> {
    let Some(info) = file_info(path)? else {
        return Ok(false);
    };
    let mut digest = None;

    for alternative in alternatives {
        let Some(other) = file_info(alternative)? else {
            continue;
        };
        if other.is_dir || other.size != info.size {
            continue;
        }
        if info.inode.is_some() && info.inode == other.inode {
            return Ok(true);
        }
        if digest.is_none() {
            digest = Some(hash_file(path)?);
        }
        if digest == Some(hash_file(alternative)?) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn memo_key(real: &Path) -> String {
    format!("is_gcc_compatible_{}", real.display())
}

/// Whether `exe` is a GCC-compatible compiler under a generic name.
///
/// The answer is memoized in `memo` for [`IDENTITY_TTL`].
pub fn is_gcc_compatible(exe: &ExecutablePath, memo: Option<&DataStore>) -> bool {
    let key = memo_key(&exe.real);
    if let Some(store) = memo {
        match store.get(&key) {
            Ok(Some(value)) => return value == "true",
            Ok(None) => {}
            Err(err) => tracing::debug!(error = %err, "identity memo unreadable"),
        }
    }

    let Some(dir) = exe.real.parent() else {
        return false;
    };
    let alternatives: Vec<PathBuf> = GCC_ALTERNATIVES
        .iter()
        .map(|name| dir.join(format!("{}{}", name, std::env::consts::EXE_SUFFIX)))
        .collect();

    let compatible = match is_file_identical_to(&exe.real, &alternatives) {
        Ok(found) => found,
        Err(err) => {
            tracing::debug!(exe = %exe.real.display(), error = %err, "identity check failed");
            false
        }
    };
    tracing::debug!(exe = %exe.real.display(), compatible, "identity check");

    if let Some(store) = memo {
        let value = if compatible { "true" } else { "false" };
        if let Err(err) = store.put(&key, value, Some(IDENTITY_TTL)) {
            tracing::debug!(error = %err, "failed to memoize identity check");
        }
    }
    compatible
}
