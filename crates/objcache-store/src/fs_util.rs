//! Platform file primitives.
//!
//! - atomic publication of a file via a unique temp file and `rename`
//! - hard-link with copy fallback
//! - durable copy (temp file in the destination directory, then `rename`)
//! - zstd compression and decompression of stored files
//! - metadata lookups that distinguish "missing" from "unreadable"
//! - recursive walks with a filter
//! - scoped temporary paths removed when dropped

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use tempfile::{NamedTempFile, TempPath};
use walkdir::WalkDir;

use crate::error::StoreResult;

/// Metadata snapshot of a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    pub accessed: SystemTime,
    /// File-system object identity, where the platform exposes one.
    pub inode: Option<u64>,
    pub is_dir: bool,
}

impl FileInfo {
    fn from_metadata(path: &Path, meta: &fs::Metadata) -> Self {
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Self {
            path: path.to_path_buf(),
            size: meta.len(),
            modified,
            accessed: meta.accessed().unwrap_or(modified),
            inode: inode_of(meta),
            is_dir: meta.is_dir(),
        }
    }
}

#[cfg(unix)]
fn inode_of(meta: &fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn inode_of(_meta: &fs::Metadata) -> Option<u64> {
    None
}

/// Stat `path`, following symlinks.
///
/// Returns `Ok(None)` when nothing exists at `path`; every other failure is
/// an error.
pub fn file_info(path: &Path) -> io::Result<Option<FileInfo>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(FileInfo::from_metadata(path, &meta))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Write `bytes` to `path` so that readers see either the old or the new
/// contents, never a mix.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = parent_dir(path)?;
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Copy `from` to `to` through a temp file in the destination directory.
///
/// The destination appears complete or not at all, and keeps the source's
/// permission bits.
pub fn durable_copy(from: &Path, to: &Path) -> io::Result<()> {
    let parent = parent_dir(to)?;
    let mut source = File::open(from)?;
    let permissions = source.metadata()?.permissions();

    let mut temp = NamedTempFile::new_in(parent)?;
    io::copy(&mut source, temp.as_file_mut())?;
    temp.flush()?;
    fs::set_permissions(temp.path(), permissions)?;
    temp.persist(to).map_err(|err| err.error)?;
    Ok(())
}

/// zstd level for compressed entry files.
pub const COMPRESSION_LEVEL: i32 = 3;

/// Write a zstd-compressed copy of `from` at `to`, keeping its permission
/// bits.
pub fn compress_file(from: &Path, to: &Path) -> io::Result<()> {
    let parent = parent_dir(to)?;
    let source = File::open(from)?;
    let permissions = source.metadata()?.permissions();

    let mut temp = NamedTempFile::new_in(parent)?;
    zstd::stream::copy_encode(source, temp.as_file_mut(), COMPRESSION_LEVEL)?;
    temp.flush()?;
    fs::set_permissions(temp.path(), permissions)?;
    temp.persist(to).map_err(|err| err.error)?;
    Ok(())
}

/// Decompress the zstd file `from` to `to`.
///
/// Like [`durable_copy`], the destination appears complete or not at all.
pub fn decompress_file(from: &Path, to: &Path) -> io::Result<()> {
    let parent = parent_dir(to)?;
    let source = File::open(from)?;
    let permissions = source.metadata()?.permissions();

    let mut temp = NamedTempFile::new_in(parent)?;
    zstd::stream::copy_decode(source, temp.as_file_mut())?;
    temp.flush()?;
    fs::set_permissions(temp.path(), permissions)?;
    temp.persist(to).map_err(|err| err.error)?;
    Ok(())
}

/// How a file was materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    Copied,
}

/// Hard-link `from` at `to`, falling back to a durable copy.
///
/// Any existing file at `to` is replaced.
pub fn link_or_copy(from: &Path, to: &Path) -> io::Result<LinkOutcome> {
    remove_if_exists(to)?;
    match fs::hard_link(from, to) {
        Ok(()) => Ok(LinkOutcome::Linked),
        Err(err) => {
            tracing::debug!(
                from = %from.display(),
                to = %to.display(),
                error = %err,
                "hard link failed, copying instead"
            );
            durable_copy(from, to)?;
            Ok(LinkOutcome::Copied)
        }
    }
}

/// Set the modification time of `path` to now.
pub fn touch(path: &Path) -> io::Result<()> {
    let file = File::options().write(true).open(path)?;
    file.set_modified(SystemTime::now())
}

/// Like [`touch`], logging instead of failing.
pub fn touch_best_effort(path: &Path) {
    if let Err(err) = touch(path) {
        tracing::debug!(path = %path.display(), error = %err, "failed to touch file");
    }
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Remove a file, logging unexpected failures.
pub fn remove_file_best_effort(path: &Path) {
    if let Err(err) = remove_if_exists(path) {
        tracing::debug!(path = %path.display(), error = %err, "failed to remove file");
    }
}

/// Canonicalize `path`, resolving a relative path against `base`.
pub fn resolve_path(base: &Path, path: &Path) -> io::Result<PathBuf> {
    fs::canonicalize(base.join(path))
}

/// Collect metadata for every regular file under `root` accepted by `filter`.
///
/// A missing `root` yields an empty list.
pub fn walk_files<F>(root: &Path, mut filter: F) -> StoreResult<Vec<FileInfo>>
where
    F: FnMut(&Path) -> bool,
{
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() || !filter(entry.path()) {
            continue;
        }
        let meta = entry.metadata()?;
        files.push(FileInfo::from_metadata(entry.path(), &meta));
    }
    Ok(files)
}

/// Total size in bytes of the regular files under `root`.
pub fn dir_size(root: &Path) -> StoreResult<u64> {
    Ok(walk_files(root, |_| true)?.iter().map(|f| f.size).sum())
}

/// Create an empty scoped file in `dir`, deleted when the handle drops.
///
/// The file is closed, so another process may write to the path.
pub fn scoped_temp_path(dir: &Path, prefix: &str, suffix: &str) -> io::Result<TempPath> {
    fs::create_dir_all(dir)?;
    let file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile_in(dir)?;
    Ok(file.into_temp_path())
}

/// SHA-256 of a file's contents as lowercase hex.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn parent_dir(path: &Path) -> io::Result<&Path> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent),
        Some(_) => Ok(Path::new(".")),
        None => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", path.display()),
        )),
    }
}
