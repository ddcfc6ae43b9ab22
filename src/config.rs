use crate::api::client::RequestOptions;
use crate::api::retry::{Backoff, RetryPolicy};
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_request_retries")]
    pub request_retries: u32,
    #[serde(default = "default_playback_attempts")]
    pub playback_attempts: u32,
    #[serde(default = "default_playback_retry_delay_ms")]
    pub playback_retry_delay_ms: u64,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub muted: bool,
}

fn default_api_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_request_retries() -> u32 {
    2
}

fn default_playback_attempts() -> u32 {
    3
}

fn default_playback_retry_delay_ms() -> u64 {
    1000
}

fn default_volume() -> f32 {
    1.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            request_retries: default_request_retries(),
            playback_attempts: default_playback_attempts(),
            playback_retry_delay_ms: default_playback_retry_delay_ms(),
            volume: default_volume(),
            muted: false,
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> AppResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| AppError::Config("Cannot find home directory".into()))?;
        Ok(home.join(".streamify"))
    }

    pub fn config_path() -> AppResult<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn credentials_path() -> AppResult<PathBuf> {
        Ok(Self::config_dir()?.join("credentials.json"))
    }

    pub fn load() -> AppResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &std::path::Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(AppError::Config(format!(
                "Config file not found at {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> AppResult<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> AppResult<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load the config, writing defaults back when the file is missing or unreadable.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config: {}. Using defaults.", e);
            let default_config = Self::default();
            if let Err(save_err) = default_config.save() {
                log::error!("Failed to save default config: {}", save_err);
            }
            default_config
        })
    }

    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            timeout: Duration::from_secs(self.request_timeout_secs),
            retries: self.request_retries,
            skip_auth: false,
        }
    }

    pub fn http_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.request_retries,
            ..RetryPolicy::http()
        }
    }

    pub fn playback_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.playback_attempts.saturating_sub(1),
            base_delay: Duration::from_millis(self.playback_retry_delay_ms),
            max_delay: Duration::from_millis(self.playback_retry_delay_ms.saturating_mul(10)),
            backoff: Backoff::Linear,
        }
    }
}
