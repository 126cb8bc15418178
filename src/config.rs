//! Configuration management for impersonatorfinder
//!
//! Configuration is loaded from `./config/impersonatorfinder.toml` unless a
//! path is given on the command line. The template embedded below is the only
//! place defaults for required sections live.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/impersonatorfinder.toml";

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = include_str!("../config/impersonatorfinder.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid URL in '{field}': {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Configuration field '{field}' is out of range: {reason}")]
    OutOfRange { field: String, reason: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub http: HttpConfig,
    pub thresholds: SignalThresholds,
    pub weights: SignalWeights,
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Profile directory API (RapidAPI-hosted)
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub key: String,
    pub host: String,
    pub user_info_url: String,
    pub search_profiles_url: String,
    #[serde(default = "default_search_page_size")]
    pub search_page_size: u32,
}

fn default_search_page_size() -> u32 {
    30
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Gate applied to each similarity signal before weighting
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct SignalThresholds {
    /// Avatar passes when its distance is at or below this value
    pub avatar: f64,
    /// Name passes when its similarity is at or above this value
    pub name: u8,
    /// Bio passes when its similarity is at or above this value
    pub bio: u8,
}

/// Weight added to the composite score for each passing signal
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct SignalWeights {
    pub avatar: f64,
    pub name: f64,
    pub bio: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Composite score at or above which a match is reported as a suspected fake
    pub min_fake_score: f64,
    /// Concurrent workers per pipeline stage
    pub worker_count: usize,
    #[serde(default = "default_profile_url_base")]
    pub profile_url_base: String,
}

fn default_profile_url_base() -> String {
    "https://www.tiktok.com/@".to_string()
}

/// Where run artifacts are written
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Keep per-account JSON documents after a successful run
    #[serde(default)]
    pub save_json: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("DATA")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            save_json: false,
        }
    }
}

impl OutputConfig {
    pub fn avatar_dir(&self) -> PathBuf {
        self.data_dir.join("avatar")
    }

    pub fn json_dir(&self) -> PathBuf {
        self.data_dir.join("JSONs")
    }

    pub fn csv_dir(&self) -> PathBuf {
        self.data_dir.join("CSVs")
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty("api.key", &self.api.key)?;
        require_non_empty("api.host", &self.api.host)?;
        require_http_url("api.user_info_url", &self.api.user_info_url)?;
        require_http_url("api.search_profiles_url", &self.api.search_profiles_url)?;
        if self.api.search_page_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "api.search_page_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        require_non_empty("http.user_agent", &self.http.user_agent)?;
        if self.http.request_timeout_secs == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "http.request_timeout_secs".to_string(),
            });
        }

        if !(self.thresholds.avatar >= 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "thresholds.avatar".to_string(),
                reason: "must be a non-negative distance".to_string(),
            });
        }
        for (field, value) in [("thresholds.name", self.thresholds.name), ("thresholds.bio", self.thresholds.bio)] {
            if value > 100 {
                return Err(ConfigError::OutOfRange {
                    field: field.to_string(),
                    reason: format!("{} is above 100", value),
                });
            }
        }

        for (field, value) in [
            ("weights.avatar", self.weights.avatar),
            ("weights.name", self.weights.name),
            ("weights.bio", self.weights.bio),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::OutOfRange {
                    field: field.to_string(),
                    reason: "weights cannot be negative".to_string(),
                });
            }
        }

        if self.analysis.worker_count == 0 {
            return Err(ConfigError::OutOfRange {
                field: "analysis.worker_count".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        require_non_empty("analysis.profile_url_base", &self.analysis.profile_url_base)?;

        Ok(())
    }

    pub fn write_default_config(path: &Path) -> Result<PathBuf, ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        io::stdin().is_terminal()
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::write_default_config(path)?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyRequired {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn require_http_url(field: &str, url: &str) -> Result<(), ConfigError> {
    require_non_empty(field, url)?;
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ConfigError::InvalidUrl {
            field: field.to_string(),
            url: url.to_string(),
        });
    }
    Ok(())
}
