//! Configuration loading
//!
//! Bootstrap configuration comes from a TOML file with two tables:
//!
//! ```toml
//! [player]
//! poll_interval_secs = 4
//! user_agent = "curl/7.64.0"
//! output_device = "default"
//!
//! [logging]
//! level = "debug"
//! file = "/tmp/piradio.log"
//! ```
//!
//! Every key is optional. Missing keys take the built-in defaults below.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (applied by the binary)
//! 2. TOML configuration file (explicit path, or the platform default)
//! 3. Built-in defaults (code constants)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Directory name used under the platform config dir and the temp dir
pub const APP_DIR_NAME: &str = "piradio";

/// Complete TOML configuration file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    /// Playback and transport settings
    pub player: PlayerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Read from this file
    File(PathBuf),
    /// Built-in defaults; `searched` is the default path that was missing
    /// (None when no config directory could be determined)
    Defaults { searched: Option<PathBuf> },
}

/// Result of [`TomlConfig::load`]
///
/// Loading happens before logging is set up, so the source is reported
/// with [`LoadedConfig::log_source`] once a subscriber exists.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub config: TomlConfig,
    pub source: ConfigSource,
}

impl LoadedConfig {
    /// Log where the configuration came from
    pub fn log_source(&self) {
        match &self.source {
            ConfigSource::File(path) => {
                info!("Loaded TOML configuration from {}", path.display());
            }
            ConfigSource::Defaults {
                searched: Some(path),
            } => {
                warn!(
                    "No config file at {}, using built-in defaults",
                    path.display()
                );
            }
            ConfigSource::Defaults { searched: None } => {
                warn!("Could not determine config directory, using built-in defaults");
            }
        }
    }
}

/// Playback and transport settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    /// Seconds to sleep when a poll finds no new segments
    pub poll_interval_secs: u64,

    /// User-Agent sent with every request
    ///
    /// Some upstreams reject requests without a recognisable agent.
    pub user_agent: String,

    /// TCP/TLS connect timeout
    pub connect_timeout_secs: u64,

    /// Whole-request timeout for bounded fetches (playlists and segments)
    pub request_timeout_secs: u64,

    /// Output device name (None = default device)
    pub output_device: Option<String>,

    /// Depth of the audio ring buffer in seconds
    pub sink_buffer_secs: u32,

    /// Directory for staged playlist/segment artifacts
    pub scratch_dir: Option<PathBuf>,

    /// Whether fetched artifacts are written to the scratch directory
    pub stage_artifacts: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 4,
            user_agent: "curl/7.64.0".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            output_device: None,
            sink_buffer_secs: 5,
            scratch_dir: None,
            stage_artifacts: true,
        }
    }
}

impl PlayerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Scratch directory, falling back to `<temp>/piradio`
    pub fn resolved_scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR_NAME))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(text)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration
    ///
    /// An explicit path must exist and parse. Without one, the platform
    /// default location is tried; if nothing is there the built-in defaults
    /// are returned and the source says so.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::load_file(&path),
            searched => Ok(LoadedConfig {
                config: Self::default(),
                source: ConfigSource::Defaults { searched },
            }),
        }
    }

    fn load_file(path: &Path) -> Result<LoadedConfig> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Ok(LoadedConfig {
            config: Self::from_toml_str(&text)?,
            source: ConfigSource::File(path.to_path_buf()),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.player.poll_interval_secs == 0 {
            return Err(Error::Config(
                "player.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.player.user_agent.trim().is_empty() {
            return Err(Error::Config("player.user_agent must not be empty".to_string()));
        }
        if self.player.sink_buffer_secs == 0 {
            return Err(Error::Config(
                "player.sink_buffer_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Platform default config file: `<config_dir>/piradio/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("config.toml"))
}
