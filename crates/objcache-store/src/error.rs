//! Error types for cache storage.

use std::io;

use thiserror::Error;

/// Errors from cache store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),

    #[error("invalid logical file name: {0:?}")]
    InvalidName(String),

    #[error("entry {key} has no file named {name}")]
    MissingFile { key: String, name: String },
}

/// Result type for cache store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// True if the error means "not there" rather than "could not look".
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::Io(err) => err.kind() == io::ErrorKind::NotFound,
            StoreError::MissingFile { .. } => true,
            _ => false,
        }
    }
}
