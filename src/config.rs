use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::generator::{Pacing, DEFAULT_API_URL};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_download_dir")]
    pub download_dir: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Initial state of the "generate video" toggle in the form.
    #[serde(default)]
    pub default_video: bool,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("prototipal");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("store.db").to_string_lossy().to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_download_dir() -> String {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("prototipal")
        .to_string_lossy()
        .to_string()
}

fn default_request_timeout() -> u64 {
    90
}

fn default_retry_delay() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            api_url: default_api_url(),
            download_dir: default_download_dir(),
            request_timeout_secs: default_request_timeout(),
            retry_delay_secs: default_retry_delay(),
            default_video: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.check()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("prototipal")
            .join("config.toml")
    }

    fn check(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        url::Url::parse(&self.api_url)
            .map_err(|e| AppError::Config(format!("invalid api_url '{}': {}", self.api_url, e)))?;
        Ok(())
    }

    /// Timings for the generation client. Ramp durations are fixed; the
    /// request timeout and retry delay come from the config file.
    pub fn pacing(&self) -> Pacing {
        Pacing {
            request_timeout: std::time::Duration::from_secs(self.request_timeout_secs),
            retry_delay: std::time::Duration::from_secs(self.retry_delay_secs),
            ..Pacing::default()
        }
    }
}
