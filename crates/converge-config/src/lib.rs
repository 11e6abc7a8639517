//! Client and polling configuration
//!
//! Settings come from a YAML file found by [`find_config_file`], then
//! environment overrides are applied on top. Every field has a default, so
//! a missing file is not an error for [`load`].

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "CONVERGE_CONFIG_PATH";
pub const ENV_ENDPOINT: &str = "CONVERGE_ENDPOINT";
pub const ENV_API_TOKEN: &str = "CONVERGE_API_TOKEN";
pub const ENV_API_VERSION: &str = "CONVERGE_API_VERSION";

const CANDIDATES: [&str; 2] = ["converge.local.yaml", "converge.yaml"];

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub client: ClientSettings,
    pub poll: PollSettings,
}

/// Control-plane connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub endpoint: String,
    /// Bearer token; never written back to disk
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    /// Sent as the `v` query parameter
    pub api_version: String,
    pub request_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.taikun.cloud".to_string(),
            api_token: None,
            api_version: "1".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// One bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitSettings {
    pub timeout_secs: u64,
    pub interval_secs: u64,
    pub initial_delay_secs: u64,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            interval_secs: 5,
            initial_delay_secs: 2,
        }
    }
}

impl WaitSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    fn validate(&self, key: &str) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: format!("{}.interval_secs", key),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Waits used by the reconciler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Read-after-write confirmation
    pub read_after_write: WaitSettings,
    /// Backup disable before the replacement is enabled
    pub backup_disable: WaitSettings,
}

impl Settings {
    /// Parse a YAML document
    pub fn from_yaml(content: &str, origin: &Path) -> Result<Self> {
        let settings: Settings =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: origin.display().to_string(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content, path)
    }

    /// Apply `CONVERGE_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var(ENV_ENDPOINT) {
            self.client.endpoint = endpoint;
        }
        if let Ok(token) = std::env::var(ENV_API_TOKEN) {
            self.client.api_token = Some(token);
        }
        if let Ok(version) = std::env::var(ENV_API_VERSION) {
            self.client.api_version = version;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.client.endpoint.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "client.endpoint".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        self.poll.read_after_write.validate("poll.read_after_write")?;
        self.poll.backup_disable.validate("poll.backup_disable")
    }
}

/// Locate the config file.
///
/// Search order:
/// 1. `CONVERGE_CONFIG_PATH`
/// 2. current directory: converge.local.yaml, converge.yaml
/// 3. `./.converge/`, same order
/// 4. `~/.config/converge/converge.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let local_dir = current_dir.join(".converge");
    if local_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = local_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("converge").join("converge.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Load settings from the discovered file (defaults when there is none) and
/// apply environment overrides.
pub fn load() -> Result<Settings> {
    let mut settings = match find_config_file() {
        Ok(path) => Settings::from_file(&path)?,
        Err(ConfigError::ConfigFileNotFound) => Settings::default(),
        Err(e) => return Err(e),
    };
    settings.apply_env();
    settings.validate()?;
    Ok(settings)
}
