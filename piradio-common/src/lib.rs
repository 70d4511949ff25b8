//! # piradio Common Library
//!
//! Shared code for the piradio player:
//! - Error type for configuration and I/O failures
//! - TOML configuration loading with built-in defaults
//! - Logging initialisation

pub mod config;
pub mod error;
pub mod logging;

pub use config::{ConfigSource, LoadedConfig, LoggingConfig, PlayerConfig, TomlConfig};
pub use error::{Error, Result};
