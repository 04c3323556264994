//! Configuration
//!
//! Three layers, later layers winning:
//! 1. Built-in defaults
//! 2. `<cache dir>/config.toml`
//! 3. `OBJCACHE_*` environment variables

mod defaults;
mod effective;
mod merge;

pub use defaults::{BuiltinDefaults, DEFAULT_MAX_CACHE_SIZE};
pub use effective::{
    cache_dir_from_env, env_overrides, parse_size, Accuracy, Config, ConfigError, ConfigOrigin,
    ConfigSource, CONFIG_FILENAME, DEFAULT_DIR_NAME, ENV_DIR,
};
pub use merge::{deep_merge, merge_layers};
