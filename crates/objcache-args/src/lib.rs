//! Command-line plumbing for compiler invocations.
//!
//! This crate turns a raw argument vector into the argument vector the
//! compiler will actually see:
//! - `@file` response files are expanded recursively, in place
//! - response-file text is decoded from UTF-8 or BOM-marked UTF-16
//! - file contents are split with POSIX or Windows quoting rules
//! - `%NAME%` environment references can be expanded for MSVC-style drivers
//!
//! Nothing here spawns processes; the only I/O is reading response files.

mod encoding;
mod response;
mod tokenize;
mod variables;

pub use encoding::{decode_text, detect_encoding, TextEncoding};
pub use response::{expand_response_files, Expansion, ResponseFileIssue, MAX_NESTING_DEPTH};
pub use tokenize::{split_posix, split_windows, QuotingStyle};
pub use variables::expand_percent_vars;
