//! Configuration management for the Cortex command line.
//!
//! Settings are read from `~/.config/cortex/config.toml` (or `--config`), then
//! overridden from `CORTEX_*` environment variables.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use client::ClientConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default backend base URL.
pub const DEFAULT_BACKEND_URL: &str = client::DEFAULT_BACKEND_URL;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("backend url must start with http:// or https://, got {0}")]
    InvalidBackendUrl(String),

    #[error("log level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("no Firebase API key configured; set [auth] api_key or CORTEX_API_KEY")]
    MissingApiKey,
}

/// Environment variable overriding the Firebase API key.
pub const API_KEY_ENV: &str = "CORTEX_API_KEY";

/// Environment variable overriding the log level.
pub const LOG_LEVEL_ENV: &str = "CORTEX_LOG_LEVEL";

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the Cortex command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Storage backend.
    pub backend: BackendConfig,

    /// Identity provider settings.
    pub auth: AuthConfig,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Download settings.
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the storage backend.
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Firebase Web API key.
    pub api_key: Option<String>,

    /// Email suggested by `login`.
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,

    /// Write logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DownloadConfig {
    /// Target directory for downloads. Defaults to the working directory.
    pub dir: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cortex")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - CORTEX_BACKEND_URL: Override the backend base URL
    /// - CORTEX_API_KEY: Override the Firebase API key
    /// - CORTEX_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    ///
    /// Returns the variables that were applied. This runs before logging is
    /// initialised, so the caller reports them.
    pub fn apply_env_overrides(&mut self) -> Vec<&'static str> {
        let mut applied = Vec::new();

        let backend = ClientConfig::from_env_or(self.backend.url.clone());
        if backend.backend_url != self.backend.url {
            self.backend.url = backend.backend_url;
            applied.push(client::BACKEND_URL_ENV);
        }

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.auth.api_key = Some(key);
                applied.push(API_KEY_ENV);
            }
        }

        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            if !level.is_empty() {
                self.logging.level = level;
                applied.push(LOG_LEVEL_ENV);
            }
        }

        applied
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.backend.url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::InvalidBackendUrl(url.clone()));
        }

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// The configured Firebase API key.
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.auth
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// Client settings for the configured backend.
    pub fn client(&self) -> ClientConfig {
        ClientConfig::with_backend_url(self.backend.url.clone())
    }

    /// Directory downloads are written to.
    pub fn download_dir(&self) -> PathBuf {
        self.download
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
