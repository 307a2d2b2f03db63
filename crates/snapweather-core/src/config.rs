//! Client configuration management.
//!
//! Configuration is stored at `~/.config/snapweather/config.json` and every
//! field can be overridden from the environment:
//!
//! - `SNAPWEATHER_BASE_URL`: API origin, e.g. `https://api.example.com`
//! - `SNAPWEATHER_TIMEOUT_SECS`: per-request timeout
//! - `SNAPWEATHER_TOKEN_ENDPOINT`: `token` or `account`
//! - `SNAPWEATHER_TOKEN_STORE`: `keyring`, `file` or `memory`
//!
//! There is no built-in base URL; it must come from the file or environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "snapweather";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// HTTP request timeout in seconds.
/// 30s allows for slow uploads while failing fast enough for good UX.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_BASE_URL: &str = "SNAPWEATHER_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "SNAPWEATHER_TIMEOUT_SECS";
pub const ENV_TOKEN_ENDPOINT: &str = "SNAPWEATHER_TOKEN_ENDPOINT";
pub const ENV_TOKEN_STORE: &str = "SNAPWEATHER_TOKEN_STORE";

/// Where `DELETE` goes when the current token is expired server-side.
///
/// Server versions disagree on the path, so this is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenExpiryEndpoint {
    /// `DELETE /account/security/token`
    #[default]
    Token,
    /// `DELETE /account`
    Account,
}

impl TokenExpiryEndpoint {
    pub fn path(self) -> &'static str {
        match self {
            TokenExpiryEndpoint::Token => "/account/security/token",
            TokenExpiryEndpoint::Account => "/account",
        }
    }
}

impl FromStr for TokenExpiryEndpoint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" => Ok(Self::Token),
            "account" => Ok(Self::Account),
            other => Err(anyhow::anyhow!(
                "Unknown token endpoint '{}', expected 'token' or 'account'",
                other
            )),
        }
    }
}

/// Which backend persists the bearer token between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStoreKind {
    #[default]
    Keyring,
    File,
    Memory,
}

impl FromStr for TokenStoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyring" => Ok(Self::Keyring),
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!(
                "Unknown token store '{}', expected 'keyring', 'file' or 'memory'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub token_expiry_endpoint: TokenExpiryEndpoint,
    #[serde(default)]
    pub token_store: TokenStoreKind,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            token_expiry_endpoint: TokenExpiryEndpoint::default(),
            token_store: TokenStoreKind::default(),
        }
    }
}

impl Config {
    /// Config pointing at `base_url` with every other field at its default
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    /// Load the config file (if any), then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_file() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Read a config file; a missing file gives the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Write to the user config file, returning its path
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in `load`)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = Some(url.trim().to_string());
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            self.request_timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of seconds", ENV_TIMEOUT_SECS))?;
        }
        if let Some(endpoint) = lookup(ENV_TOKEN_ENDPOINT) {
            self.token_expiry_endpoint = endpoint.parse()?;
        }
        if let Some(store) = lookup(ENV_TOKEN_STORE) {
            self.token_store = store.parse()?;
        }
        Ok(())
    }

    /// The validated API origin
    pub fn base_url(&self) -> Result<Url> {
        let raw = self.base_url.as_deref().ok_or_else(|| {
            anyhow::anyhow!("No API base URL configured (set {})", ENV_BASE_URL)
        })?;
        let url = Url::parse(raw).with_context(|| format!("Invalid API base URL '{}'", raw))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("API base URL must use http or https, got '{}'", url.scheme());
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the token file and logs
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}
