//! Configuration module for bluewatch.
//!
//! This module provides all configuration types and loading functionality.
//! Configuration is loaded from YAML files; every section has defaults.

mod bus;
mod logging;
mod monitor;

pub use bus::{BusConfig, BusKind, PROPERTIES_CHANGED_MEMBER, PROPERTIES_INTERFACE};
pub use logging::{LogFormat, LogLevel, LogOutput, LoggingConfig};
pub use monitor::MonitorConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::BluewatchError;

/// Default configuration search paths, in priority order.
pub const DEFAULT_CONFIG_PATHS: [&str; 4] = [
    "/etc/bluewatch/config.yaml",
    "/etc/bluewatch/config.yml",
    "bluewatch.yaml",
    "bluewatch.yml",
];

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bus and object naming.
    pub bus: BusConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Default monitor subscription.
    pub monitor: MonitorConfig,
}

impl Config {
    /// Loads configuration from an optional path.
    /// If path is None, uses default search paths.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, BluewatchError> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => {
                for path in &DEFAULT_CONFIG_PATHS {
                    if Path::new(path).exists() {
                        return Self::load_from_path(path);
                    }
                }

                // No config file found, use defaults
                Ok(Self::default())
            }
        }
    }

    /// Loads configuration from a YAML file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, BluewatchError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            BluewatchError::config_with_source(
                format!("Failed to read config file '{}'", path.as_ref().display()),
                e,
            )
        })?;

        Self::load_from_str(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn load_from_str(content: &str) -> Result<Self, BluewatchError> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| BluewatchError::config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration.
    fn validate(&self) -> Result<(), BluewatchError> {
        self.bus.validate()?;

        if self.logging.output == LogOutput::File && self.logging.file_path.is_none() {
            return Err(BluewatchError::config(
                "logging.file_path is required when output is file",
            ));
        }

        Ok(())
    }
}
