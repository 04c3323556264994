//! Recursive `@file` response-file expansion.
//!
//! Expansion is iterative: a stack of frames, one per response file being
//! read, replaces recursion. The files on the stack form the active chain,
//! and a file that is already on the chain is not opened again.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::encoding::decode_text;
use crate::tokenize::QuotingStyle;

/// Deepest allowed chain of response files including each other.
pub const MAX_NESTING_DEPTH: usize = 32;

/// A response file that was left unexpanded.
///
/// Every issue is recovered from by keeping the literal `@file` token, which
/// the real compiler will then diagnose itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseFileIssue {
    #[error("response file {} could not be read: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("response file {} includes itself", .path.display())]
    Cycle { path: PathBuf },

    #[error("response file {} is nested too deeply", .path.display())]
    DepthExceeded { path: PathBuf },
}

/// Result of expanding an argument vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    /// Arguments with every readable response file spliced in place.
    pub args: Vec<String>,
    /// Response files that were successfully read, in read order.
    pub files_read: Vec<PathBuf>,
    /// Response files that were kept as literal tokens.
    pub issues: Vec<ResponseFileIssue>,
}

struct Frame {
    tokens: std::vec::IntoIter<String>,
    origin: Option<PathBuf>,
}

/// Expand `@file` tokens in `args`, recursively.
///
/// Relative response-file paths are resolved against `cwd`. The contents of
/// each file are split with `style` and spliced in place of the token, so
/// argument order is preserved.
pub fn expand_response_files(args: &[String], style: QuotingStyle, cwd: &Path) -> Expansion {
    let mut expansion = Expansion::default();
    let mut stack = vec![Frame {
        tokens: args.to_vec().into_iter(),
        origin: None,
    }];

    loop {
        let Some(frame) = stack.last_mut() else {
            break;
        };
        let Some(token) = frame.tokens.next() else {
            stack.pop();
            continue;
        };

        let name = match token.strip_prefix('@') {
            Some(name) if !name.is_empty() => name,
            _ => {
                expansion.args.push(token);
                continue;
            }
        };

        let joined = cwd.join(name);
        let path = fs::canonicalize(&joined).unwrap_or(joined);

        let on_chain = stack
            .iter()
            .filter_map(|f| f.origin.as_deref())
            .any(|origin| origin == path);
        if on_chain {
            tracing::warn!(path = %path.display(), "response file cycle, keeping literal token");
            expansion.issues.push(ResponseFileIssue::Cycle { path });
            expansion.args.push(token);
            continue;
        }

        // The root frame is not a response file.
        if stack.len() > MAX_NESTING_DEPTH {
            tracing::warn!(path = %path.display(), "response files nested too deeply");
            expansion.issues.push(ResponseFileIssue::DepthExceeded { path });
            expansion.args.push(token);
            continue;
        }

        match fs::read(&path) {
            Ok(bytes) => {
                let tokens = style.split(&decode_text(&bytes));
                tracing::debug!(path = %path.display(), count = tokens.len(), "expanded response file");
                expansion.files_read.push(path.clone());
                stack.push(Frame {
                    tokens: tokens.into_iter(),
                    origin: Some(path),
                });
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "response file not readable");
                expansion.issues.push(ResponseFileIssue::Unreadable {
                    path,
                    reason: err.to_string(),
                });
                expansion.args.push(token);
            }
        }
    }

    expansion
}
