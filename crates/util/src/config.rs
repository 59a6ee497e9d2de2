//! Form configuration persisted as JSON.
//!
//! The file lives at `~/.config/cean/config.json` on most platforms; set
//! `CEAN_CONFIG_PATH` to point elsewhere. A missing file means defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dirs_next::{config_dir, home_dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable allowing callers to override the config file path.
pub const CONFIG_PATH_ENV: &str = "CEAN_CONFIG_PATH";

const CONFIG_FILE_NAME: &str = "config.json";

/// Error surfaced when the configuration file cannot be read.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct FormConfig {
    /// Quiet period before a typed file path is inspected.
    pub debounce_ms: u64,
    /// Catalogue the dataset is uploaded to; shown in the confirmation dialog.
    pub scicat_url: String,
    /// Upload immediately when there are no validation errors.
    pub skip_confirmation: bool,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
    /// Offered checksum algorithms; the first one is preselected.
    pub checksum_algorithms: Vec<String>,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            scicat_url: "https://staging.scicat.ess.eu/".to_string(),
            skip_confirmation: false,
            log_filter: None,
            checksum_algorithms: vec!["blake2b".to_string(), "sha256".to_string(), "md5".to_string()],
        }
    }
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    if trimmed == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = trimmed.strip_prefix("~/").or_else(|| trimmed.strip_prefix("~\\")) {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(trimmed)
}

/// Returns the configuration path, honoring `CEAN_CONFIG_PATH`.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cean")
        .join(CONFIG_FILE_NAME)
}

/// Loads the configuration from the default path.
pub fn load_config() -> Result<FormConfig, ConfigError> {
    load_config_from_path(&default_config_path())
}

/// Loads the configuration from `path`; a missing file yields defaults.
pub fn load_config_from_path(path: &Path) -> Result<FormConfig, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(FormConfig::default());
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
