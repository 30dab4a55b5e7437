//! TOML-backed client settings.
//!
//! Every field carries a serde default so partially written or older config
//! files keep loading. Environment variables override the service endpoints
//! after the file is read.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;

/// Default filename used to store the client configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Environment variable overriding [`ClientConfig::api_url`].
pub const API_URL_ENV: &str = "SNAPCLASS_API_URL";
/// Environment variable overriding [`ClientConfig::device_url`].
pub const DEVICE_URL_ENV: &str = "SNAPCLASS_DEVICE_URL";

const MIN_REENCODE_QUALITY: f32 = 0.05;
const MIN_PREVIEW_INTERVAL_MS: u64 = 100;

/// Errors that may occur while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to resolve config directory: {0}")]
    Dir(#[from] app_dirs::AppDirError),
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
}

/// Client settings: service endpoints, capture cadence and upload tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the classification/training service, e.g. `http://host:5000/api`.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Base URL of the networked camera device.
    #[serde(default = "default_device_url")]
    pub device_url: String,
    /// Live preview refresh cadence in milliseconds.
    #[serde(default = "default_preview_interval_ms")]
    pub preview_interval_ms: u64,
    /// Maximum wait for a batch capture archive, in seconds.
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
    /// Re-encode quality factor applied before upload (0.0..=1.0).
    #[serde(default = "default_reencode_quality")]
    pub reencode_quality: f32,
    #[serde(default)]
    pub http: HttpSettings,
}

/// Transport timeouts for the shared HTTP agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            device_url: default_device_url(),
            preview_interval_ms: default_preview_interval_ms(),
            batch_timeout_secs: default_batch_timeout_secs(),
            reencode_quality: default_reencode_quality(),
            http: HttpSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Clamp out-of-range values and strip trailing slashes from URLs.
    pub fn normalized(mut self) -> Self {
        self.api_url = self.api_url.trim().trim_end_matches('/').to_string();
        self.device_url = self.device_url.trim().trim_end_matches('/').to_string();
        self.preview_interval_ms = self.preview_interval_ms.max(MIN_PREVIEW_INTERVAL_MS);
        self.batch_timeout_secs = self.batch_timeout_secs.max(1);
        self.reencode_quality = if self.reencode_quality.is_finite() {
            self.reencode_quality.clamp(MIN_REENCODE_QUALITY, 1.0)
        } else {
            default_reencode_quality()
        };
        self
    }

    pub fn preview_interval(&self) -> Duration {
        Duration::from_millis(self.preview_interval_ms)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    fn apply_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(API_URL_ENV)
            && !url.trim().is_empty()
        {
            self.api_url = url;
        }
        if let Ok(url) = std::env::var(DEVICE_URL_ENV)
            && !url.trim().is_empty()
        {
            self.device_url = url;
        }
        self
    }
}

/// Resolve the configuration file path inside the app root.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from the app root, returning defaults if missing.
pub fn load_or_default() -> Result<ClientConfig, ConfigError> {
    let path = config_path()?;
    Ok(load_from(&path)?.apply_env_overrides().normalized())
}

/// Persist configuration to the app root.
pub fn save(config: &ClientConfig) -> Result<(), ConfigError> {
    save_to_path(config, &config_path()?)
}

/// Load a config file, falling back to defaults when it does not exist.
pub fn load_from(path: &Path) -> Result<ClientConfig, ConfigError> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<ClientConfig>(&text)
        .map(ClientConfig::normalized)
        .map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
}

/// Save configuration to a specific path, creating parent directories as needed.
pub fn save_to_path(config: &ClientConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let data = toml::to_string_pretty(config).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, data).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn default_api_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_device_url() -> String {
    "http://raspberrypi.local:5000".to_string()
}

fn default_preview_interval_ms() -> u64 {
    1000
}

fn default_batch_timeout_secs() -> u64 {
    20
}

fn default_reencode_quality() -> f32 {
    0.9
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = load_from(&dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.batch_timeout(), Duration::from_secs(20));
        assert_eq!(config.preview_interval(), Duration::from_secs(1));
    }

    #[test]
    fn partial_file_fills_remaining_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "api_url = \"http://svc:8080/api/\"\n[http]\nread_timeout_secs = 5\n",
        )
        .unwrap();
        let config = load_from(&path).unwrap();
        assert_eq!(config.api_url, "http://svc:8080/api");
        assert_eq!(config.http.read_timeout_secs, 5);
        assert_eq!(config.http.connect_timeout_secs, 10);
        assert_eq!(config.reencode_quality, 0.9);
    }

    #[test]
    fn normalized_clamps_quality_and_interval() {
        let config = ClientConfig {
            reencode_quality: 3.0,
            preview_interval_ms: 1,
            batch_timeout_secs: 0,
            ..ClientConfig::default()
        }
        .normalized();
        assert_eq!(config.reencode_quality, 1.0);
        assert_eq!(config.preview_interval_ms, MIN_PREVIEW_INTERVAL_MS);
        assert_eq!(config.batch_timeout_secs, 1);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = ClientConfig {
            device_url: "http://10.0.0.7:5000".into(),
            batch_timeout_secs: 45,
            ..ClientConfig::default()
        };
        save_to_path(&config, &path).unwrap();
        assert_eq!(load_from(&path).unwrap(), config);
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "api_url = [").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }
}
