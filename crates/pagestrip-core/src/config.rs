//! Pipeline configuration.
//!
//! Every field has a default, so an empty TOML file (or no file at all) is a
//! valid configuration:
//!
//! ```toml
//! strip_count = 30
//! concurrency = 3
//! jpeg_quality = 90
//! log_level = "info"
//!
//! [store]
//! base_url = "https://thinkzone.co/cloud-storage"
//! timeout_secs = 30
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::partition::MAX_STRIP_COUNT;

pub const DEFAULT_STRIP_COUNT: usize = 30;
pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;
pub const DEFAULT_BASE_URL: &str = "https://thinkzone.co/cloud-storage";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Remote store settings (`[store]` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Reject strips above this size before sending them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_payload_bytes: Option<usize>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_payload_bytes: None,
        }
    }
}

impl StoreSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of vertical strips per page.
    pub strip_count: usize,
    /// Maximum number of strips processed at once.
    pub concurrency: usize,
    pub jpeg_quality: u8,
    /// Where encoded strips wait for upload. Defaults to a `pagestrip`
    /// directory under the system temp dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
    pub log_level: String,
    pub store: StoreSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strip_count: DEFAULT_STRIP_COUNT,
            concurrency: DEFAULT_CONCURRENCY,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            scratch_dir: None,
            log_level: "info".to_string(),
            store: StoreSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scratch directory, resolving the default.
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("pagestrip"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.strip_count == 0 {
            return Err(ConfigError::Invalid("strip_count must be at least 1".into()));
        }
        if self.strip_count > MAX_STRIP_COUNT {
            return Err(ConfigError::Invalid(format!(
                "strip_count must be at most {MAX_STRIP_COUNT}, got {}",
                self.strip_count
            )));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "jpeg_quality must be in 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.store.timeout_secs == 0 {
            return Err(ConfigError::Invalid("store.timeout_secs must be positive".into()));
        }
        if self.store.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("store.base_url must not be empty".into()));
        }
        Ok(())
    }
}
