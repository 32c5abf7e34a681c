//! Capability catalog
//!
//! Static enumerations of the legal sample rates, bandwidths, gain modes,
//! RF inputs and sample formats. Each list maps a stable key to a label and
//! an effective value; insertion order is display order.

use crate::types::{format_hz, GainMode, RfPort, SampleFormat};

/// First selectable sample rate in Hz
pub const MIN_SAMPLE_RATE: u32 = 2_500_000;

/// Last selectable sample rate in Hz
pub const MAX_SAMPLE_RATE: u32 = 61_440_000;

/// Hardware ceiling for the analog RX bandwidth in Hz
pub const MAX_BANDWIDTH: u32 = 52_000_000;

/// Step between neighbouring rate and bandwidth entries
const RATE_STEP: usize = 500_000;

/// One `(key, label, value)` entry
#[derive(Debug, Clone, PartialEq)]
pub struct OptionEntry<K, V> {
    pub key: K,
    pub label: String,
    pub value: V,
}

/// Ordered list of options with unique keys and labels
#[derive(Debug, Clone)]
pub struct OptionList<K, V> {
    entries: Vec<OptionEntry<K, V>>,
}

impl<K, V> Default for OptionList<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: PartialEq, V: PartialEq> OptionList<K, V> {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; returns false when the key or label is already taken
    pub fn define(&mut self, key: K, label: impl Into<String>, value: V) -> bool {
        let label = label.into();
        if self.key_exists(&key) || self.name_exists(&label) {
            return false;
        }
        self.entries.push(OptionEntry { key, label, value });
        true
    }

    pub fn key_exists(&self, key: &K) -> bool {
        self.entries.iter().any(|e| &e.key == key)
    }

    pub fn name_exists(&self, label: &str) -> bool {
        self.entries.iter().any(|e| e.label == label)
    }

    pub fn value_exists(&self, value: &V) -> bool {
        self.entries.iter().any(|e| &e.value == value)
    }

    /// Position of a key in display order
    pub fn key_id(&self, key: &K) -> Option<usize> {
        self.entries.iter().position(|e| &e.key == key)
    }

    /// Position of a value in display order
    pub fn value_id(&self, value: &V) -> Option<usize> {
        self.entries.iter().position(|e| &e.value == value)
    }

    pub fn get(&self, id: usize) -> Option<&OptionEntry<K, V>> {
        self.entries.get(id)
    }

    pub fn key(&self, id: usize) -> Option<&K> {
        self.entries.get(id).map(|e| &e.key)
    }

    pub fn value(&self, id: usize) -> Option<&V> {
        self.entries.get(id).map(|e| &e.value)
    }

    pub fn label(&self, id: usize) -> Option<&str> {
        self.entries.get(id).map(|e| e.label.as_str())
    }

    pub fn first(&self) -> Option<&OptionEntry<K, V>> {
        self.entries.first()
    }

    /// Value for `key`, or the first entry's value when the key is unknown
    pub fn value_or_first(&self, key: &K) -> Option<&V> {
        self.key_id(key)
            .and_then(|id| self.value(id))
            .or_else(|| self.first().map(|e| &e.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OptionEntry<K, V>> {
        self.entries.iter()
    }

    /// Labels in display order
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// All capability lists of a front end
#[derive(Debug, Clone)]
pub struct CapabilityCatalog {
    pub sample_rates: OptionList<u32, u32>,
    pub bandwidths: OptionList<u32, u32>,
    pub gain_modes: OptionList<String, GainMode>,
    pub rf_ports: OptionList<String, RfPort>,
    pub sample_formats: OptionList<String, SampleFormat>,
}

impl Default for CapabilityCatalog {
    fn default() -> Self {
        Self::ad9361()
    }
}

impl CapabilityCatalog {
    /// Catalog for AD9361-based front ends
    pub fn ad9361() -> Self {
        let mut sample_rates = OptionList::new();
        for rate in (MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).step_by(RATE_STEP) {
            sample_rates.define(rate, format_hz(rate as f64), rate);
        }
        sample_rates.define(MAX_SAMPLE_RATE, format_hz(MAX_SAMPLE_RATE as f64), MAX_SAMPLE_RATE);

        let mut bandwidths = OptionList::new();
        bandwidths.define(0, "Auto", 0);
        for bw in (1_000_000..=MAX_BANDWIDTH).step_by(RATE_STEP) {
            bandwidths.define(bw, format_hz(bw as f64), bw);
        }

        let mut gain_modes = OptionList::new();
        for mode in GainMode::ALL {
            gain_modes.define(mode.key().to_string(), mode.label(), mode);
        }

        let mut rf_ports = OptionList::new();
        for port in RfPort::ALL {
            rf_ports.define(port.key().to_string(), port.label(), port);
        }

        let mut sample_formats = OptionList::new();
        for format in SampleFormat::ALL {
            sample_formats.define(format.key().to_string(), format.label(), format);
        }

        Self {
            sample_rates,
            bandwidths,
            gain_modes,
            rf_ports,
            sample_formats,
        }
    }

    pub fn is_valid_sample_rate(&self, rate: u32) -> bool {
        self.sample_rates.key_exists(&rate)
    }

    pub fn is_valid_bandwidth(&self, bandwidth: u32) -> bool {
        self.bandwidths.key_exists(&bandwidth)
    }

    /// Sample rate if listed, otherwise the first listed rate
    pub fn sample_rate_or_default(&self, rate: u32) -> u32 {
        self.sample_rates
            .value_or_first(&rate)
            .copied()
            .unwrap_or(MIN_SAMPLE_RATE)
    }

    /// Bandwidth if listed, otherwise the first entry (auto)
    pub fn bandwidth_or_default(&self, bandwidth: u32) -> u32 {
        self.bandwidths
            .value_or_first(&bandwidth)
            .copied()
            .unwrap_or(0)
    }

    /// Gain mode for a stored key, falling back to the first entry
    pub fn gain_mode_or_default(&self, key: &str) -> GainMode {
        self.gain_modes
            .value_or_first(&key.to_string())
            .copied()
            .unwrap_or_default()
    }

    /// RF port for a stored key, falling back to the first entry
    pub fn rf_port_or_default(&self, key: &str) -> RfPort {
        self.rf_ports
            .value_or_first(&key.to_string())
            .copied()
            .unwrap_or_default()
    }

    /// Sample format for a stored key, falling back to the first entry
    pub fn sample_format_or_default(&self, key: &str) -> SampleFormat {
        self.sample_formats
            .value_or_first(&key.to_string())
            .copied()
            .unwrap_or_default()
    }
}
