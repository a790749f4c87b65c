//! Runtime settings.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. optional `bulk-edit.toml` (or the file passed to [`Settings::load_from`])
//! 3. `BULK_EDIT__*` environment variables, after loading `.env`

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::api::LoggingMode;
use crate::dialog::PollPolicy;
use crate::error::AppError;
use crate::logging::LogFormat;

const DEFAULT_CONFIG_FILE: &str = "bulk-edit";
const ENV_PREFIX: &str = "BULK_EDIT";

fn default_resource() -> String {
    "movimientos".to_string()
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Settings as they appear in files and the environment.
#[derive(Debug, Deserialize)]
struct RawSettings {
    base_url: String,
    #[serde(default)]
    api_token: Option<String>,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default = "default_resource")]
    resource: String,
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
    #[serde(default)]
    max_poll_duration_secs: Option<u64>,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_format: LogFormat,
    #[serde(default)]
    logging_mode: LoggingMode,
}

/// Validated settings for the bulk-edit client.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: Url,
    pub api_token: Option<SecretString>,
    pub tenant_id: Option<String>,
    pub resource: String,
    pub poll_interval: Duration,
    pub max_poll_duration: Option<Duration>,
    pub request_timeout_secs: u64,
    pub log_level: String,
    pub log_format: LogFormat,
    pub logging_mode: LoggingMode,
}

impl Settings {
    /// Loads settings from `bulk-edit.toml` (if present) and the environment.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false))
            .add_source(env_source())
            .build()?;

        Self::from_config(config)
    }

    /// Loads settings from an explicit file, still letting the environment
    /// override it.
    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        let config = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(env_source())
            .build()?;

        Self::from_config(config)
    }

    /// Deserializes and validates an already-built configuration.
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        let raw: RawSettings = config.try_deserialize()?;
        Self::try_from(raw)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.poll_interval,
            max_duration: self.max_poll_duration,
        }
    }
}

impl TryFrom<RawSettings> for Settings {
    type Error = AppError;

    fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
        let base_url = Url::parse(raw.base_url.trim())
            .map_err(|e| AppError::Config(format!("base_url is not a valid URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config("base_url must be an http(s) URL".to_string()));
        }

        if raw.poll_interval_ms == 0 {
            return Err(AppError::Config("poll_interval_ms must be greater than 0".to_string()));
        }
        if raw.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        let resource = raw.resource.trim().trim_matches('/').to_string();
        if resource.is_empty() {
            return Err(AppError::Config("resource must not be empty".to_string()));
        }

        Ok(Self {
            base_url,
            api_token: raw
                .api_token
                .filter(|t| !t.trim().is_empty())
                .map(SecretString::from),
            tenant_id: raw.tenant_id.filter(|t| !t.trim().is_empty()),
            resource,
            poll_interval: Duration::from_millis(raw.poll_interval_ms),
            max_poll_duration: raw
                .max_poll_duration_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            request_timeout_secs: raw.request_timeout_secs,
            log_level: raw.log_level,
            log_format: raw.log_format,
            logging_mode: raw.logging_mode,
        })
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}
