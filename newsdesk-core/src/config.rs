//! Runtime configuration.
//!
//! Loaded from a TOML file; every field has a default so partial files work.
//!
//! ```toml
//! cache_dir = "data/news_cache"
//! default_lookback_days = 7
//! default_max_items = 10
//! cache_valid_days = 1
//!
//! [source]
//! timeout_secs = 30
//! max_retries = 3
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_EASTMONEY_ENDPOINT: &str = "https://search-api-web.eastmoney.com/search/jsonp";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything the news service needs from its environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    /// Directory holding one JSON file per security.
    pub cache_dir: PathBuf,
    /// Lookback window, in days, when the caller gives none.
    pub default_lookback_days: u32,
    /// Item cap when the caller gives none.
    pub default_max_items: usize,
    /// Maximum age of a cache record, in days.
    pub cache_valid_days: u32,
    pub source: SourceConfig,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            default_lookback_days: 7,
            default_max_items: 10,
            cache_valid_days: 1,
            source: SourceConfig::default(),
        }
    }
}

/// HTTP source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// First retry delay; doubles on each further attempt.
    pub base_delay_ms: u64,
    /// Articles requested per call.
    pub page_size: u32,
    pub breaker_cooldown_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_EASTMONEY_ENDPOINT.to_string(),
            timeout_secs: 30,
            max_retries: 3,
            base_delay_ms: 500,
            page_size: 50,
            breaker_cooldown_secs: 30 * 60,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }
}

impl NewsConfig {
    /// Load and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_lookback_days == 0 {
            return Err(ConfigError::NotPositive {
                field: "default_lookback_days",
            });
        }
        if self.default_max_items == 0 {
            return Err(ConfigError::NotPositive {
                field: "default_max_items",
            });
        }
        if self.source.timeout_secs == 0 {
            return Err(ConfigError::NotPositive {
                field: "source.timeout_secs",
            });
        }
        if self.source.page_size == 0 {
            return Err(ConfigError::NotPositive {
                field: "source.page_size",
            });
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("cache_dir is empty".into()));
        }
        if self.source.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("source.endpoint is empty".into()));
        }
        Ok(())
    }
}

/// Platform cache directory, or `data/news_cache` when there is none.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("newsdesk").join("news"))
        .unwrap_or_else(|| PathBuf::from("data/news_cache"))
}
