//! Locating the real compiler.
//!
//! The tool is usually installed as a symlink named after the compiler
//! (`gcc -> objcache`) placed early on `PATH`, so resolution must skip any
//! candidate that is really this tool, or the invocation would recurse.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A resolved executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutablePath {
    /// Canonical path with every symlink resolved.
    pub real: PathBuf,
    /// Path as found, before symlink resolution.
    pub virtual_path: PathBuf,
    /// The program token exactly as invoked.
    pub invoked: String,
}

impl ExecutablePath {
    /// Lowercase file stem of the real path (`clang-15`, `cl`).
    pub fn real_stem(&self) -> String {
        stem_of(&self.real)
    }

    /// Lowercase file stem of the path as found (`cc`, `clang-cl`).
    pub fn virtual_stem(&self) -> String {
        stem_of(&self.virtual_path)
    }

    /// Lowercase file name of the real path, extension included.
    pub fn real_name(&self) -> String {
        self.real
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

/// Errors while locating an executable
#[derive(Debug, thiserror::Error)]
pub enum ExeError {
    #[error("executable not found: {0}")]
    NotFound(String),

    #[error("IO error resolving {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn has_separator(program: &str) -> bool {
    program.contains('/') || (cfg!(windows) && program.contains('\\'))
}

/// Value of `PATH` in `env`, matched case-insensitively as Windows does.
fn search_path(env: &BTreeMap<String, String>) -> Option<&str> {
    env.get("PATH")
        .or_else(|| {
            env.iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("PATH"))
                .map(|(_, value)| value)
        })
        .map(String::as_str)
}

/// Resolve `program` the way a shell would, skipping any candidate whose
/// real file stem is `exclude`.
///
/// A program given with a directory component is used directly unless it
/// turns out to be the excluded tool, in which case the search continues on
/// `PATH` with its file name.
pub fn find_executable(
    program: &str,
    env: &BTreeMap<String, String>,
    cwd: &Path,
    exclude: &str,
) -> Result<ExecutablePath, ExeError> {
    if program.is_empty() {
        return Err(ExeError::NotFound(String::new()));
    }

    let exclude = exclude.to_lowercase();
    let mut name = program.to_string();

    if has_separator(program) {
        let candidate = cwd.join(program);
        let real = fs::canonicalize(&candidate).map_err(|source| ExeError::Io {
            path: candidate.clone(),
            source,
        })?;
        if stem_of(&real) != exclude {
            return Ok(ExecutablePath {
                real,
                virtual_path: candidate,
                invoked: program.to_string(),
            });
        }
        tracing::debug!(program, "explicit path is this tool, searching PATH");
        name = candidate
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ExeError::NotFound(program.to_string()))?;
    }

    let candidates = which::which_in_all(&name, search_path(env), cwd)
        .map_err(|_| ExeError::NotFound(program.to_string()))?;
    for candidate in candidates {
        let real = match fs::canonicalize(&candidate) {
            Ok(real) => real,
            Err(err) => {
                tracing::debug!(path = %candidate.display(), error = %err, "skipping unresolvable candidate");
                continue;
            }
        };
        if stem_of(&real) == exclude {
            continue;
        }
        return Ok(ExecutablePath {
            real,
            virtual_path: candidate,
            invoked: program.to_string(),
        });
    }

    Err(ExeError::NotFound(program.to_string()))
}
