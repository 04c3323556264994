//! Logging setup.
//!
//! Everything logs through `tracing`. Output goes to stderr so that it never
//! mixes with compiler output replayed on stdout, and the default level is
//! `warn` so a healthy build stays quiet.

use tracing_subscriber::EnvFilter;

/// Fallback filter when the configured directives do not parse.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Build the filter from the configured level and an optional `RUST_LOG`.
///
/// `RUST_LOG` directives are appended, so they refine the configured level.
pub fn env_filter(level: &str, rust_log: Option<&str>) -> EnvFilter {
    let configured = level.trim();
    let configured = if configured.is_empty() {
        DEFAULT_LOG_LEVEL
    } else {
        configured
    };

    let directives = match rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        Some(extra) => format!("{},{}", configured, extra),
        None => configured.to_string(),
    };

    EnvFilter::try_new(&directives)
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging(level: &str, rust_log: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level, rust_log))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
