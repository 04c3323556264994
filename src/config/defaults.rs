//! Built-in defaults (layer 1)
//!
//! Hardcoded defaults for every configuration value except the cache
//! directory, which depends on the user's home directory.

use serde::{Deserialize, Serialize};

/// Default maximum cache size: 5 GiB.
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Accuracy level (default: "default")
    pub accuracy: String,

    /// Direct mode (default: false)
    pub direct_mode: bool,

    /// Hard links between cache and build tree (default: false)
    pub hard_links: bool,

    /// Entry compression, "off" or "all" (default: "off")
    pub compress: String,

    /// Maximum cache size in bytes (default: 5 GiB)
    pub max_cache_size: u64,

    /// Read-only cache: look up but never commit (default: false)
    pub read_only: bool,

    /// Bypass the cache entirely (default: false)
    pub disable: bool,

    /// Log filter directive (default: "warn")
    pub log_level: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            accuracy: "default".to_string(),
            direct_mode: false,
            hard_links: false,
            compress: "off".to_string(),
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            read_only: false,
            disable: false,
            log_level: "warn".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "accuracy": self.accuracy,
            "direct_mode": self.direct_mode,
            "hard_links": self.hard_links,
            "compress": self.compress,
            "max_cache_size": self.max_cache_size,
            "read_only": self.read_only,
            "disable": self.disable,
            "log_level": self.log_level,
        })
    }
}
