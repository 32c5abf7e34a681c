//! Configuration module for PlutoAcq-RS
//!
//! This module handles application configuration including:
//! - Discovery settings (scan schemes, supported models, static endpoints)
//! - Front-end settings (sub-device names, hardware limits, default tuning)
//! - Stream settings (block size, kernel buffer budget, output depth)
//! - Per-device settings persisted across runs (see [`store`])
//!
//! # App Data Location
//!
//! Application data is stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.hxyulin.plutoacq-rs/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.plutoacq-rs/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.plutoacq-rs\`
//!
//! # Files
//!
//! - `config.toml` - Application configuration
//! - `plutosdr_source_config.json` - Per-device front-end settings
//!
//! # Example
//!
//! ```ignore
//! use plutoacq_rs::config::AppConfig;
//!
//! let mut config = AppConfig::load_or_default(&AppConfig::default_path().unwrap());
//! config.stream.block_size = 500_000;
//! config.save(&path)?;
//! ```

pub mod store;

pub use store::{ConfigField, ConfigRepository, DeviceSettings, JsonConfigStore, MemoryConfigStore};

use crate::catalog::MAX_BANDWIDTH;
use crate::error::{AcqError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.hxyulin.plutoacq-rs";

/// Application configuration filename
pub const CONFIG_FILE: &str = "config.toml";

/// Per-device settings filename
pub const DEVICE_STORE_FILE: &str = "plutosdr_source_config.json";

/// Default upper bound on samples per refill
pub const DEFAULT_BLOCK_SIZE: usize = 1_000_000;

/// Default total sample budget across all kernel buffers
pub const DEFAULT_KERNEL_BUFFER_BUDGET: usize = 32_000_000;

/// Default cap on the number of kernel buffers
pub const DEFAULT_MAX_KERNEL_BUFFERS: usize = 8;

/// Default center frequency used before the first tune
pub const DEFAULT_CENTER_FREQUENCY: f64 = 100_000_000.0;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir()
        .ok_or_else(|| AcqError::Config("Could not determine app data directory".to_string()))?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            AcqError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the per-device settings document
pub fn device_store_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(DEVICE_STORE_FILE))
}

// ==================== Discovery ====================

/// A fixed endpoint listed after every scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticEndpoint {
    /// Description used as the registry key and display name
    pub description: String,
    /// Connection endpoint, e.g. `ip:192.168.2.1`
    pub uri: String,
}

/// Device discovery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Transport schemes passed to the scan
    #[serde(default = "default_scan_schemes")]
    pub scan_schemes: String,

    /// Substrings identifying supported models in a scan description
    #[serde(default = "default_whitelist")]
    pub whitelist: Vec<String>,

    /// Endpoints appended after every scan (for hosts that cannot scan)
    #[serde(default)]
    pub static_endpoints: Vec<StaticEndpoint>,
}

fn default_scan_schemes() -> String {
    "usb:ip".to_string()
}

fn default_whitelist() -> Vec<String> {
    ["PlutoSDR", "ANTSDR", "LibreSDR", "Pluto+", "ad9361", "FISH"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            scan_schemes: default_scan_schemes(),
            whitelist: default_whitelist(),
            static_endpoints: Vec::new(),
        }
    }
}

// ==================== Front End ====================

/// Front-end naming and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontEndSettings {
    /// Physical-layer device (tuning, gain, RF routing)
    #[serde(default = "default_phy_device")]
    pub phy_device: String,

    /// Streaming device (sample rails and ring buffer)
    #[serde(default = "default_stream_device")]
    pub stream_device: String,

    /// Ceiling for the automatic RX bandwidth in Hz
    #[serde(default = "default_max_bandwidth")]
    pub max_bandwidth: u32,

    /// Center frequency applied before the first tune, in Hz
    #[serde(default = "default_center_frequency")]
    pub default_frequency: f64,
}

fn default_phy_device() -> String {
    "ad9361-phy".to_string()
}

fn default_stream_device() -> String {
    "cf-ad9361-lpc".to_string()
}

fn default_max_bandwidth() -> u32 {
    MAX_BANDWIDTH
}

fn default_center_frequency() -> f64 {
    DEFAULT_CENTER_FREQUENCY
}

impl Default for FrontEndSettings {
    fn default() -> Self {
        Self {
            phy_device: default_phy_device(),
            stream_device: default_stream_device(),
            max_bandwidth: default_max_bandwidth(),
            default_frequency: default_center_frequency(),
        }
    }
}

// ==================== Streaming ====================

/// Acquisition buffer sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Upper bound on samples per refill
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Total samples across all kernel buffers
    #[serde(default = "default_kernel_buffer_budget")]
    pub kernel_buffer_budget: usize,

    /// Cap on the number of kernel buffers
    #[serde(default = "default_max_kernel_buffers")]
    pub max_kernel_buffers: usize,

    /// Blocks queued towards the consumer before the worker blocks
    #[serde(default = "default_channel_depth")]
    pub channel_depth: usize,
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_kernel_buffer_budget() -> usize {
    DEFAULT_KERNEL_BUFFER_BUDGET
}

fn default_max_kernel_buffers() -> usize {
    DEFAULT_MAX_KERNEL_BUFFERS
}

fn default_channel_depth() -> usize {
    crate::engine::DEFAULT_CHANNEL_DEPTH
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            kernel_buffer_budget: default_kernel_buffer_budget(),
            max_kernel_buffers: default_max_kernel_buffers(),
            channel_depth: default_channel_depth(),
        }
    }
}

// ==================== App Config ====================

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Device discovery
    #[serde(default)]
    pub discovery: DiscoverySettings,

    /// Front-end naming and limits
    #[serde(default)]
    pub front_end: FrontEndSettings,

    /// Buffer sizing
    #[serde(default)]
    pub stream: StreamSettings,
}

impl AppConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        app_data_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AcqError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            AcqError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Load a configuration file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load configuration, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AcqError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| AcqError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            AcqError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.discovery.scan_schemes, "usb:ip");
        assert_eq!(config.discovery.whitelist.len(), 6);
        assert_eq!(config.front_end.phy_device, "ad9361-phy");
        assert_eq!(config.front_end.max_bandwidth, 52_000_000);
        assert_eq!(config.stream.block_size, 1_000_000);
        assert_eq!(config.stream.max_kernel_buffers, 8);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [stream]
            block_size = 250000

            [[discovery.static_endpoints]]
            description = "Default (192.168.2.1)"
            uri = "ip:192.168.2.1"
            "#,
        )
        .unwrap();

        assert_eq!(config.stream.block_size, 250_000);
        assert_eq!(config.stream.kernel_buffer_budget, 32_000_000);
        assert_eq!(config.discovery.static_endpoints.len(), 1);
        assert_eq!(config.discovery.scan_schemes, "usb:ip");
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = AppConfig::default();
        config.front_end.default_frequency = 433_920_000.0;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_on_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "this is = = not toml").unwrap();

        assert_eq!(AppConfig::load_or_default(&path), AppConfig::default());
        assert!(AppConfig::load(&path).is_err());
    }
}
