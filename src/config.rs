//! Configuration management for skyfollow.
//!
//! Settings come from a TOML file (auto-discovered or passed via
//! `--config`), overridden by environment variables. Credentials are
//! deliberately not part of the config file; they come from flags, the
//! environment, or the settings store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default remote service endpoint.
pub const DEFAULT_SERVICE_URL: &str = "https://bsky.social";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Data directory holding the state database.
    pub data_dir: PathBuf,
    /// Base URL of the remote service.
    pub service_url: String,
    /// Per-request timeout in seconds (transport-level only).
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            service_url: DEFAULT_SERVICE_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Settings {
    /// Load settings from an explicit config file, or auto-discover one.
    ///
    /// Discovery order: `./skyfollow.toml`, then
    /// `$XDG_CONFIG_HOME/skyfollow/config.toml`. Missing files fall back
    /// to defaults. Environment variables override file values.
    pub fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = match config_path {
            Some(path) => Self::from_file(path)?,
            None => match discover_config_file() {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        settings.apply_env();
        Ok(settings)
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", path.display(), e))?;
        let settings: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("failed to parse config {}: {}", path.display(), e))?;
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("SKYF_SERVICE_URL") {
            if !url.is_empty() {
                self.service_url = url;
            }
        }
        if let Ok(dir) = std::env::var("SKYF_DATA_DIR") {
            if !dir.is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
    }

    /// Path to the state database inside the data directory.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("skyfollow.db")
    }

    /// Request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Ensure the data directory exists.
    pub fn ensure_data_dir(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| {
            anyhow::anyhow!(
                "failed to create data dir {}: {}",
                self.data_dir.display(),
                e
            )
        })
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("skyfollow"))
        .unwrap_or_else(|| PathBuf::from(".skyfollow"))
}

fn discover_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("skyfollow.toml");
    if local.exists() {
        return Some(local);
    }
    let user = dirs::config_dir()?.join("skyfollow").join("config.toml");
    if user.exists() {
        return Some(user);
    }
    None
}
