use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that overrides `log.filter`.
pub const LOG_ENV: &str = "ARBOR_LOG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
    #[error("invalid setting: {0}")]
    Invalid(&'static str),
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub cache: CacheSettings,
    pub store: StoreSettings,
    pub retry: RetrySettings,
    pub log: LogSettings,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    /// Built trees kept in memory, keyed by root
    pub trees: u32,
}

impl Default for CacheSettings {
    fn default() -> Self { Self { trees: 128 } }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    #[default]
    File,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    pub kind: StoreKind,
    /// Directory for the file store
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self { Self { kind: StoreKind::File, path: PathBuf::from("arbor-trees") } }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 50, max_backoff_ms: 2_000, multiplier: 2.0 }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self { Self { filter: "info".to_string() } }
}

impl LogSettings {
    /// `ARBOR_LOG` wins over the configured filter when set.
    pub fn effective_filter(&self) -> String {
        std::env::var(LOG_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.filter.clone())
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.trees == 0 {
            return Err(ConfigError::Invalid("cache.trees must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1"));
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(ConfigError::Invalid("retry.multiplier must be >= 1.0"));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms",
            ));
        }
        if self.store.kind == StoreKind::File && self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("store.path is required for the file store"));
        }
        Ok(())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let txt = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        load_settings_toml(&txt)
    }
}

/// Parse and validate settings from TOML text. Missing tables and keys take
/// their defaults.
pub fn load_settings_toml(input: &str) -> Result<Settings, ConfigError> {
    let s = toml::from_str::<Settings>(input)?;
    s.validate()?;
    Ok(s)
}
