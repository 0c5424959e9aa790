//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vchat_api::RetryConfig;

/// Backend used when neither the config file nor the environment names one
pub const DEFAULT_API_URL: &str = "http://localhost:5000";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Configuration for vchat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the chat backend
    pub api_url: Option<String>,
    /// Session mode: "guest" or "registered"
    pub mode: Option<String>,
    /// Timeout for REST calls; stream bodies are never cut off
    pub request_timeout_secs: Option<u64>,
    /// Directory holding the guest transcript
    pub session_dir: Option<String>,
    /// Backoff for rejected (503) sends
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Retry configuration as written in the file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vchat")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("VCHAT_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            api_url: Some(DEFAULT_API_URL.to_string()),
            mode: Some("guest".to_string()),
            request_timeout_secs: Some(DEFAULT_REQUEST_TIMEOUT_SECS),
            session_dir: None,
            retry: RetrySettings::default(),
        };

        default_config.save_to(&path)?;
        Ok(path)
    }

    /// Backend URL: `$VCHAT_API_URL`, then the file, then the default
    pub fn api_url(&self) -> String {
        self.resolve_api_url(std::env::var("VCHAT_API_URL").ok())
    }

    fn resolve_api_url(&self, from_env: Option<String>) -> String {
        from_env
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn is_registered(&self) -> bool {
        matches!(
            self.mode.as_deref().map(str::to_lowercase).as_deref(),
            Some("registered")
        )
    }

    /// Timeout for REST calls; `0` disables it
    pub fn request_timeout(&self) -> Option<Duration> {
        match self
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
        {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn session_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.session_dir {
            return PathBuf::from(dir);
        }
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vchat")
    }

    pub fn retry_config(&self) -> RetryConfig {
        let defaults = RetryConfig::default();
        let retry = &self.retry;
        RetryConfig {
            max_retries: retry.max_retries.unwrap_or(defaults.max_retries),
            initial_delay: retry
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            max_delay: retry
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            backoff_multiplier: match retry.backoff_multiplier {
                Some(m) if m.is_finite() && m >= 1.0 => m,
                Some(m) => {
                    eprintln!(
                        "Warning: Ignoring retry.backoff_multiplier = {} (must be at least 1.0)",
                        m
                    );
                    defaults.backoff_multiplier
                }
                None => defaults.backoff_multiplier,
            },
        }
    }
}

pub fn example_config() -> &'static str {
    r#"# vchat configuration file
# Place at ~/.config/vchat/config.toml (Linux), ~/Library/Application Support/vchat/config.toml (Mac)
# or %APPDATA%\vchat\config.toml (Windows)

# Chat backend ($VCHAT_API_URL and --api-url take precedence)
api_url = "http://localhost:5000"

# Session mode: "guest" (transcript kept locally) or "registered"
# (needs ~/.config/vchat/credentials.json)
mode = "guest"

# Timeout for REST calls in seconds; 0 disables it.
# Streamed answers are never cut off.
request_timeout_secs = 10

# Where the guest transcript is kept between runs (defaults to the cache dir)
# session_dir = "~/.cache/vchat"

# Backoff for sends rejected with 503 (registered sessions only)
[retry]
# max_retries = 3
# initial_delay_ms = 1000
# max_delay_ms = 60000
# backoff_multiplier = 2.0
"#
}
