//! Configuration loading and config file resolution
//!
//! Bootstrap settings come from an optional TOML file. Every field has a
//! built-in default, so a missing file is a warning, not a failure.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Lessons API queried at startup
pub const DEFAULT_ENDPOINT: &str = "https://ramadan.megatron-soft.com/api/lessons";

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "RDL_CONFIG";

/// Smallest accepted interval between progress events
const MIN_PROGRESS_INTERVAL_MS: u64 = 50;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Lessons API endpoint (http or https)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP server bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Request timeout for the lessons and audio fetches, in seconds.
    /// 0 disables the timeout.
    #[serde(default)]
    pub request_timeout_secs: u64,

    /// Interval between progress events while a lesson plays
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Output volume (0.0-1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level for RDL crates (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_port() -> u16 {
    5750
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_progress_interval_ms() -> u64 {
    250
}

fn default_volume() -> f32 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            port: default_port(),
            bind_address: default_bind_address(),
            request_timeout_secs: 0,
            progress_interval_ms: default_progress_interval_ms(),
            volume: default_volume(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Validate fields, clamping where a safe value exists
    pub fn validate(mut self) -> Result<Self> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(Error::Config(format!(
                "endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }

        if self.progress_interval_ms < MIN_PROGRESS_INTERVAL_MS {
            return Err(Error::Config(format!(
                "progress_interval_ms must be at least {}, got {}",
                MIN_PROGRESS_INTERVAL_MS, self.progress_interval_ms
            )));
        }

        if !self.volume.is_finite() {
            warn!("Invalid volume {}, using 1.0", self.volume);
            self.volume = 1.0;
        }
        self.volume = self.volume.clamp(0.0, 1.0);

        Ok(self)
    }

    /// Request timeout, None when disabled
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Interval between progress events
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Config file resolution in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. Platform config directory, if the file exists
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().filter(|path| path.exists())
}

/// Platform config file location (`<config_dir>/rdl/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rdl").join("config.toml"))
}

/// Resolve, load and validate configuration.
///
/// An explicitly named file that does not exist falls back to defaults with
/// a warning; a file that exists but does not parse is an error.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let config = match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            TomlConfig::load(&path)?
        }
        Some(path) => {
            warn!("Config file {} not found, using defaults", path.display());
            TomlConfig::default()
        }
        None => {
            info!("No config file found, using defaults");
            TomlConfig::default()
        }
    };

    config.validate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.port, 5750);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.progress_interval(), Duration::from_millis(250));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = TomlConfig::from_toml_str("port = 8080\n").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.volume, 1.0);
    }

    #[test]
    fn test_full_toml() {
        let content = r#"
            endpoint = "http://localhost:9000/lessons"
            port = 6000
            bind_address = "0.0.0.0"
            request_timeout_secs = 20
            progress_interval_ms = 500
            volume = 0.5

            [logging]
            level = "debug"
        "#;

        let config = TomlConfig::from_toml_str(content).unwrap().validate().unwrap();
        assert_eq!(config.endpoint, "http://localhost:9000/lessons");
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(20)));
        assert_eq!(config.progress_interval(), Duration::from_millis(500));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            TomlConfig::from_toml_str("port = \"not a number\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_non_http_endpoint() {
        let config = TomlConfig {
            endpoint: "ftp://example.com/lessons".to_string(),
            ..TomlConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_tiny_progress_interval() {
        let config = TomlConfig {
            progress_interval_ms: 10,
            ..TomlConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_clamps_volume() {
        let loud = TomlConfig {
            volume: 3.0,
            ..TomlConfig::default()
        };
        assert_eq!(loud.validate().unwrap().volume, 1.0);

        let broken = TomlConfig {
            volume: f32::NAN,
            ..TomlConfig::default()
        };
        assert_eq!(broken.validate().unwrap().volume, 1.0);
    }

    #[test]
    fn test_cli_path_has_priority() {
        let cli = PathBuf::from("/tmp/explicit.toml");
        assert_eq!(
            resolve_config_path(Some(&cli), "RDL_TEST_UNSET_VARIABLE"),
            Some(cli)
        );
    }
}
