//! objcache - transparent compiler cache
//!
//! Sits in front of GCC, Clang and MSVC compile invocations, derives a
//! content-addressed key from everything that affects the output, and
//! restores previously produced object files instead of recompiling.

pub mod config;
pub mod exe_path;
pub mod hasher;
pub mod key;
pub mod logging;
pub mod orchestrator;
pub mod signal;
pub mod sys;
pub mod wrapper;

/// Name of this tool; never resolved as the compiler.
pub const TOOL_NAME: &str = "objcache";

pub use config::{Accuracy, Config, ConfigError};
pub use hasher::CacheKey;
pub use key::CacheKeyBuilder;
pub use orchestrator::{Orchestrator, OrchestratorError, Outcome, OutcomeKind};
pub use signal::{SignalHandler, SignalState};
pub use wrapper::{Invocation, ProgramWrapper};
