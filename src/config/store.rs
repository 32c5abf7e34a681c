//! Per-device settings persistence
//!
//! Settings chosen by the user are remembered per device description and
//! restored when the device is selected again. The document layout is:
//!
//! ```text
//! {
//!     "device": "<last selected description>",
//!     "devices": {
//!         "<description>": {
//!             "samplerate": 4000000,
//!             "bandwidth": 0,
//!             "gainMode": "manual",
//!             "gain": 20.0,
//!             "rfinput": "rx1",
//!             "iqmode": "cs16"
//!         }
//!     }
//! }
//! ```
//!
//! Every field is optional; a missing field means "use the default".
//! The repository is injected into the controller as a trait object so the
//! storage can be swapped for tests.

use crate::error::{AcqError, Result};
use crate::types::{GainMode, RfPort, SampleFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Stored settings of one device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samplerate: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<u32>,

    /// Gain mode key (see [`GainMode::key`])
    #[serde(rename = "gainMode", default, skip_serializing_if = "Option::is_none")]
    pub gain_mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain: Option<f32>,

    /// RF port key (see [`RfPort::key`])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rfinput: Option<String>,

    /// Sample format key (see [`SampleFormat::key`])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iqmode: Option<String>,
}

impl DeviceSettings {
    /// Overwrite one field
    pub fn apply(&mut self, field: &ConfigField) {
        match field {
            ConfigField::SampleRate(v) => self.samplerate = Some(*v),
            ConfigField::Bandwidth(v) => self.bandwidth = Some(*v),
            ConfigField::GainMode(v) => self.gain_mode = Some(v.key().to_string()),
            ConfigField::Gain(v) => self.gain = Some(*v),
            ConfigField::RfPort(v) => self.rfinput = Some(v.key().to_string()),
            ConfigField::SampleFormat(v) => self.iqmode = Some(v.key().to_string()),
        }
    }
}

/// One user-driven settings change
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigField {
    SampleRate(u32),
    Bandwidth(u32),
    GainMode(GainMode),
    Gain(f32),
    RfPort(RfPort),
    SampleFormat(SampleFormat),
}

/// Storage for per-device settings
///
/// Methods take `&self`; implementations synchronize internally so the
/// repository can be shared behind an `Arc`.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigRepository: Send + Sync {
    /// Description of the last selected device
    fn selected_device(&self) -> Option<String>;

    /// Remember the selected device
    fn set_selected_device(&self, description: &str) -> Result<()>;

    /// Stored settings of a device (empty when unknown)
    fn get(&self, device: &str) -> DeviceSettings;

    /// Store one field of a device's settings
    fn put(&self, device: &str, field: ConfigField) -> Result<()>;
}

/// Whole persisted document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    device: String,
    #[serde(default)]
    devices: BTreeMap<String, DeviceSettings>,
}

impl StoreDocument {
    fn selected_device(&self) -> Option<String> {
        if self.device.is_empty() {
            None
        } else {
            Some(self.device.clone())
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ==================== JSON Store ====================

/// File-backed store, saved after every change
#[derive(Debug)]
pub struct JsonConfigStore {
    path: PathBuf,
    document: Mutex<StoreDocument>,
}

impl JsonConfigStore {
    /// Open (or create) the document at `path`
    ///
    /// A document that is unreadable or lacks the `device`/`devices` keys
    /// is replaced by an empty one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let document = match Self::read_document(&path) {
            Some(document) => document,
            None => {
                tracing::info!("Resetting device settings at {:?}", path);
                let document = StoreDocument::default();
                Self::write_document(&path, &document)?;
                document
            }
        };

        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    /// Open the document in the application data directory
    pub fn open_default() -> Result<Self> {
        let dir = super::ensure_app_data_dir()?;
        Self::open(dir.join(super::DEVICE_STORE_FILE))
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(path: &Path) -> Option<StoreDocument> {
        let content = std::fs::read_to_string(path).ok()?;
        let value: serde_json::Value = match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to parse device settings {:?}: {}", path, e);
                return None;
            }
        };
        if value.get("device").is_none() || value.get("devices").is_none() {
            return None;
        }
        match serde_json::from_value(value) {
            Ok(document) => Some(document),
            Err(e) => {
                tracing::warn!("Invalid device settings {:?}: {}", path, e);
                None
            }
        }
    }

    fn write_document(path: &Path, document: &StoreDocument) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AcqError::Config(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let content = serde_json::to_string_pretty(document)
            .map_err(|e| AcqError::Serialization(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            AcqError::Config(format!("Failed to write settings {:?}: {}", path, e))
        })
    }
}

impl ConfigRepository for JsonConfigStore {
    fn selected_device(&self) -> Option<String> {
        lock(&self.document).selected_device()
    }

    fn set_selected_device(&self, description: &str) -> Result<()> {
        let mut document = lock(&self.document);
        document.device = description.to_string();
        Self::write_document(&self.path, &document)
    }

    fn get(&self, device: &str) -> DeviceSettings {
        lock(&self.document)
            .devices
            .get(device)
            .cloned()
            .unwrap_or_default()
    }

    fn put(&self, device: &str, field: ConfigField) -> Result<()> {
        let mut document = lock(&self.document);
        document
            .devices
            .entry(device.to_string())
            .or_default()
            .apply(&field);
        Self::write_document(&self.path, &document)
    }
}

// ==================== Memory Store ====================

/// Volatile store, used by the simulator and tests
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    document: Mutex<StoreDocument>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload the settings of one device
    pub fn with_device(self, device: &str, settings: DeviceSettings) -> Self {
        lock(&self.document)
            .devices
            .insert(device.to_string(), settings);
        self
    }
}

impl ConfigRepository for MemoryConfigStore {
    fn selected_device(&self) -> Option<String> {
        lock(&self.document).selected_device()
    }

    fn set_selected_device(&self, description: &str) -> Result<()> {
        lock(&self.document).device = description.to_string();
        Ok(())
    }

    fn get(&self, device: &str) -> DeviceSettings {
        lock(&self.document)
            .devices
            .get(device)
            .cloned()
            .unwrap_or_default()
    }

    fn put(&self, device: &str, field: ConfigField) -> Result<()> {
        lock(&self.document)
            .devices
            .entry(device.to_string())
            .or_default()
            .apply(&field);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_saves_immediately() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let store = JsonConfigStore::open(&path).unwrap();
        store.set_selected_device("PlutoSDR A").unwrap();
        store.put("PlutoSDR A", ConfigField::SampleRate(8_000_000)).unwrap();
        store.put("PlutoSDR A", ConfigField::GainMode(GainMode::SlowAttack)).unwrap();

        let reopened = JsonConfigStore::open(&path).unwrap();
        assert_eq!(reopened.selected_device().as_deref(), Some("PlutoSDR A"));
        let settings = reopened.get("PlutoSDR A");
        assert_eq!(settings.samplerate, Some(8_000_000));
        assert_eq!(settings.gain_mode.as_deref(), Some("slow_attack"));
        assert_eq!(settings.bandwidth, None);
    }

    #[test]
    fn test_document_uses_stored_key_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let store = JsonConfigStore::open(&path).unwrap();
        store.put("dev", ConfigField::GainMode(GainMode::Hybrid)).unwrap();
        store.put("dev", ConfigField::RfPort(RfPort::Rx2)).unwrap();
        store.put("dev", ConfigField::SampleFormat(SampleFormat::Cs8)).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["devices"]["dev"]["gainMode"], "hybrid");
        assert_eq!(value["devices"]["dev"]["rfinput"], "rx2");
        assert_eq!(value["devices"]["dev"]["iqmode"], "cs8");
    }

    #[test]
    fn test_document_without_required_keys_is_reset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"devices": {"dev": {"samplerate": 8000000}}}"#).unwrap();

        let store = JsonConfigStore::open(&path).unwrap();
        assert_eq!(store.get("dev"), DeviceSettings::default());
        assert!(store.selected_device().is_none());

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value.get("device").is_some());
    }

    #[test]
    fn test_corrupt_document_is_reset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonConfigStore::open(&path).unwrap();
        assert_eq!(store.get("anything"), DeviceSettings::default());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryConfigStore::new().with_device(
            "dev",
            DeviceSettings {
                gain: Some(30.0),
                ..Default::default()
            },
        );
        store.put("dev", ConfigField::Bandwidth(5_000_000)).unwrap();

        let settings = store.get("dev");
        assert_eq!(settings.gain, Some(30.0));
        assert_eq!(settings.bandwidth, Some(5_000_000));
        assert_eq!(store.get("other"), DeviceSettings::default());
    }
}
