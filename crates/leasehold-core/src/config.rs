//! Application configuration management.
//!
//! Configuration is stored at `~/.config/leasehold/config.json` and holds
//! the API base URL override, the last username and the durable store choice.
//! The `LEASEHOLD_API_URL` environment variable takes precedence over the file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "leasehold";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the API base URL
pub const API_URL_ENV: &str = "LEASEHOLD_API_URL";

/// Development backend used when nothing else is configured
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8002/api";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub last_username: Option<String>,
    /// Keep tokens in the OS keychain instead of a credentials file
    #[serde(default)]
    pub use_keyring: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Resolve the API base URL: environment, then config file, then default.
    pub fn base_url(&self) -> String {
        let env_url = std::env::var(API_URL_ENV).ok();
        Self::resolve_base_url(env_url.as_deref(), self.api_base_url.as_deref())
    }

    fn resolve_base_url(env_url: Option<&str>, file_url: Option<&str>) -> String {
        let url = env_url
            .filter(|u| !u.trim().is_empty())
            .or(file_url.filter(|u| !u.trim().is_empty()))
            .unwrap_or(DEFAULT_API_BASE_URL);
        url.trim().trim_end_matches('/').to_string()
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the credential file and cookie jar
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}
