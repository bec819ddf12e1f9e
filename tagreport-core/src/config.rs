//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/tagreport/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/tagreport/` (~/.config/tagreport/)
//! - Data: `$XDG_DATA_HOME/tagreport/` (~/.local/share/tagreport/)
//! - State/Logs: `$XDG_STATE_HOME/tagreport/` (~/.local/state/tagreport/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Platform API access
    #[serde(default)]
    pub api: ApiConfig,

    /// Web scraping for data the API does not expose
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Report output
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API access configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Base URL of the Teams instance (e.g. `https://stackoverflowteams.com/c/my-team`)
    pub base_url: Option<String>,

    /// API access token (Business/Basic, and v3 calls on Enterprise)
    pub token: Option<String>,

    /// API key (Enterprise only)
    pub key: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,

    /// Max retry attempts for transient failures
    #[serde(default = "default_api_max_retries")]
    pub max_retries: usize,

    /// Initial retry delay; doubles per attempt
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    /// Items per page (API maximum is 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Upper bound on concurrent per-tag requests
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            key: None,
            timeout_secs: default_api_timeout(),
            max_retries: default_api_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            page_size: default_page_size(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl ApiConfig {
    /// Validate numeric settings, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > 100 {
            return Err(Error::Config(
                "api.page_size must be between 1 and 100".to_string(),
            ));
        }
        if self.max_concurrent_requests == 0 {
            return Err(Error::Config(
                "api.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config(
                "api.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_api_timeout() -> u64 {
    30
}

fn default_api_max_retries() -> usize {
    5
}

fn default_retry_base_delay() -> u64 {
    500
}

fn default_page_size() -> u32 {
    100
}

fn default_max_concurrent_requests() -> usize {
    4
}

/// Scraper configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScraperConfig {
    /// Enable webhook/watcher scraping
    #[serde(default)]
    pub enabled: bool,

    /// Cookie header copied from a logged-in browser session
    pub session_cookie: Option<String>,
}

/// Report output configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct OutputConfig {
    /// Directory for CSV reports (defaults to the current directory)
    pub report_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.api.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/tagreport/config.toml` (~/.config/tagreport/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("tagreport").join("config.toml")
    }

    /// Returns the data directory path (for the snapshot blob)
    ///
    /// `$XDG_DATA_HOME/tagreport/` (~/.local/share/tagreport/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("tagreport")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/tagreport/` (~/.local/state/tagreport/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("tagreport")
    }

    /// Returns the default snapshot file path
    ///
    /// `$XDG_DATA_HOME/tagreport/snapshot.json`
    pub fn snapshot_path() -> PathBuf {
        Self::data_dir().join("snapshot.json")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/tagreport/tagreport.log` (~/.local/state/tagreport/tagreport.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("tagreport.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
