//! Effective configuration with provenance
//!
//! The effective config is the merge of the built-in defaults, the
//! `config.toml` file inside the cache directory, and `OBJCACHE_*`
//! environment variables, plus a record of which of those contributed.

use objcache_store::Compression;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;

/// Name of the config file inside the cache directory
pub const CONFIG_FILENAME: &str = "config.toml";

/// Cache directory name under the home directory
pub const DEFAULT_DIR_NAME: &str = ".objcache";

/// Environment variable selecting the cache directory
pub const ENV_DIR: &str = "OBJCACHE_DIR";

/// How hard the cache tries to produce outputs identical to a real compile.
///
/// Ordered: `Sloppy < Default < Strict`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Accuracy {
    Sloppy,
    #[default]
    Default,
    Strict,
}

impl FromStr for Accuracy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sloppy" => Ok(Accuracy::Sloppy),
            "default" => Ok(Accuracy::Default),
            "strict" => Ok(Accuracy::Strict),
            other => Err(ConfigError::ValidationError(format!(
                "unknown accuracy {:?} (expected sloppy, default or strict)",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Accuracy {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Accuracy::Sloppy => "sloppy",
            Accuracy::Default => "default",
            Accuracy::Strict => "strict",
        };
        f.write_str(name)
    }
}

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Env,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    /// Origin of this source
    pub origin: ConfigOrigin,

    /// File path (None for builtin/env)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/env)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Effective configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cache root directory
    pub dir: PathBuf,

    pub accuracy: Accuracy,

    /// Use direct mode where the wrapper supports it
    pub direct_mode: bool,

    /// Hard-link files between the cache and the build tree
    pub hard_links: bool,

    /// Compression of newly stored entry files
    pub compress: Compression,

    /// Housekeeping target size in bytes (0 = unlimited)
    pub max_cache_size: u64,

    /// Look up entries but never commit new ones
    pub read_only: bool,

    /// Run every command unmodified
    pub disable: bool,

    /// Log filter directive
    pub log_level: String,

    /// Contributing sources in precedence order
    #[serde(default, skip_deserializing)]
    pub sources: Vec<ConfigSource>,
}

/// Boolean settings that can be overridden from the environment.
const BOOL_ENV_KEYS: &[(&str, &str)] = &[
    ("OBJCACHE_DIRECT_MODE", "direct_mode"),
    ("OBJCACHE_HARD_LINKS", "hard_links"),
    ("OBJCACHE_READ_ONLY", "read_only"),
    ("OBJCACHE_DISABLE", "disable"),
];

impl Config {
    /// Load the effective configuration for the given environment.
    pub fn load(env: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let dir = cache_dir_from_env(env)?;
        Self::build(&dir, env_overrides(env)?)
    }

    /// Build the configuration for cache directory `dir`.
    ///
    /// Reads `<dir>/config.toml` if present, then applies `overrides`.
    pub fn build(dir: &Path, overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        let file = dir.join(CONFIG_FILENAME);
        if file.is_file() {
            let (value, digest) = load_toml_file(&file)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(file.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(overrides) = overrides {
            layers.push(overrides);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Env,
                path: None,
                digest: None,
            });
        }

        let mut merged = merge_layers(layers);
        if let Value::Object(map) = &mut merged {
            map.insert(
                "dir".to_string(),
                Value::String(dir.to_string_lossy().to_string()),
            );
        }

        let mut config: Config = serde_json::from_value(merged)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.sources = sources;
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults rooted at `dir`, ignoring files and environment.
    pub fn with_defaults(dir: impl Into<PathBuf>) -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            dir: dir.into(),
            accuracy: Accuracy::default(),
            direct_mode: defaults.direct_mode,
            hard_links: defaults.hard_links,
            compress: Compression::default(),
            max_cache_size: defaults.max_cache_size,
            read_only: defaults.read_only,
            disable: defaults.disable,
            log_level: defaults.log_level,
            sources: Vec::new(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "log_level must not be empty".to_string(),
            ));
        }
        if self.dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "cache directory must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Resolve the cache directory from `OBJCACHE_DIR`, falling back to
/// `~/.objcache`.
pub fn cache_dir_from_env(env: &BTreeMap<String, String>) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = env.get(ENV_DIR).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    ["HOME", "USERPROFILE"]
        .iter()
        .filter_map(|name| env.get(*name))
        .find(|home| !home.is_empty())
        .map(|home| Path::new(home).join(DEFAULT_DIR_NAME))
        .ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "cannot locate the cache directory: set {} or HOME",
                ENV_DIR
            ))
        })
}

/// Collect `OBJCACHE_*` overrides as a config layer.
pub fn env_overrides(env: &BTreeMap<String, String>) -> Result<Option<Value>, ConfigError> {
    let mut map = Map::new();

    if let Some(accuracy) = env.get("OBJCACHE_ACCURACY") {
        let accuracy: Accuracy = accuracy.parse()?;
        map.insert("accuracy".to_string(), Value::String(accuracy.to_string()));
    }
    if let Some(raw) = env.get("OBJCACHE_COMPRESS") {
        let name = match parse_compression(raw)? {
            Compression::Off => "off",
            Compression::All => "all",
        };
        map.insert("compress".to_string(), Value::String(name.to_string()));
    }
    for (var, key) in BOOL_ENV_KEYS {
        if let Some(raw) = env.get(*var) {
            map.insert(key.to_string(), Value::Bool(parse_bool(var, raw)?));
        }
    }
    if let Some(raw) = env.get("OBJCACHE_MAX_CACHE_SIZE") {
        map.insert("max_cache_size".to_string(), Value::from(parse_size(raw)?));
    }
    if let Some(level) = env.get("OBJCACHE_LOG") {
        map.insert("log_level".to_string(), Value::String(level.clone()));
    }

    Ok(if map.is_empty() {
        None
    } else {
        Some(Value::Object(map))
    })
}

fn parse_compression(raw: &str) -> Result<Compression, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "off" | "none" => Ok(Compression::Off),
        "all" => Ok(Compression::All),
        other => Err(ConfigError::ValidationError(format!(
            "unknown compression {:?} (expected off or all)",
            other
        ))),
    }
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::ValidationError(format!(
            "{} must be a boolean, got {:?}",
            var, other
        ))),
    }
}

/// Parse a byte size with an optional binary suffix (`k`, `m`, `g`, `t`).
pub fn parse_size(raw: &str) -> Result<u64, ConfigError> {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    let digits = lower.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let suffix = &lower[digits.len()..];
    let multiplier: u64 = match suffix {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        "t" | "tb" | "tib" => 1 << 40,
        _ => {
            return Err(ConfigError::ValidationError(format!(
                "invalid size {:?}",
                trimmed
            )))
        }
    };
    digits
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| ConfigError::ValidationError(format!("invalid size {:?}", trimmed)))
}

/// Load and parse a TOML file, returning the value and digest
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
    let digest = hex::encode(Sha256::digest(&bytes));

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
    let table: toml::Value = toml::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

    Ok((toml_to_json(table), digest))
}

/// Convert TOML Value to JSON Value
fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
