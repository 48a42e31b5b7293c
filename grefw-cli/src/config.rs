//! Configuration file support for grefw.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (GREFW_*)
//! 3. Local config file (./grefw.toml)
//! 4. Global config file (~/.config/grefw/config.toml)

use directories::ProjectDirs;
use grefw::UpdateConfig;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Local configuration file name.
pub const LOCAL_CONFIG_FILE: &str = "grefw.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Scanner serial port (e.g., "/dev/ttyACM0" or "COM3").
    pub port: Option<String>,
    /// Baud rate.
    pub baud: Option<u32>,
}

/// Scanner selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Connected scanner model (e.g., "psr800").
    pub model: Option<String>,
    /// Firmware family to load (defaults to the model's own).
    pub firmware: Option<String>,
}

/// Firmware update tuning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSection {
    /// Communications timeout in milliseconds.
    pub comms_timeout_ms: Option<u64>,
    /// Re-sends allowed for a rejected packet.
    pub max_retries: Option<u32>,
    /// Dump all serial traffic.
    #[serde(default)]
    pub protocol_debug: bool,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Scanner selection.
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// Update tuning.
    #[serde(default)]
    pub update: UpdateSection,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "grefw").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.connection.port.is_some() {
            self.connection.port = other.connection.port;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }

        if other.scanner.model.is_some() {
            self.scanner.model = other.scanner.model;
        }
        if other.scanner.firmware.is_some() {
            self.scanner.firmware = other.scanner.firmware;
        }

        if other.update.comms_timeout_ms.is_some() {
            self.update.comms_timeout_ms = other.update.comms_timeout_ms;
        }
        if other.update.max_retries.is_some() {
            self.update.max_retries = other.update.max_retries;
        }
        if other.update.protocol_debug {
            self.update.protocol_debug = true;
        }
    }

    /// Orchestrator settings, falling back to the library defaults.
    pub fn update_config(&self) -> grefw::Result<UpdateConfig> {
        let mut config = UpdateConfig::default();
        if let Some(ms) = self.update.comms_timeout_ms {
            config = config.with_comms_timeout(Duration::from_millis(ms));
        }
        if let Some(retries) = self.update.max_retries {
            config = config.with_max_retries(retries);
        }
        config.validate()?;
        Ok(config)
    }
}
