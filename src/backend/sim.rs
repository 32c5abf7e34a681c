//! Simulated front end for testing
//!
//! This module provides an in-memory AD9361-style front end that implements
//! the [`IioTransport`] family of traits. It is used by the test-suite and by
//! the `--simulate` mode of the command-line tool, so the acquisition
//! pipeline can be exercised without hardware.
//!
//! # Features
//!
//! - **Register file**: numbered registers per device, with the streaming
//!   core's status register behaving write-one-to-clear
//! - **Attribute log**: every channel/debug attribute write is recorded in
//!   order, so tests can check what was applied and in which sequence
//! - **Sample generation**: buffers are filled from a [`SimPattern`]
//! - **Fault injection**: failing attribute writes, missing devices or
//!   channels, buffer allocation failure, refill failure after N cycles,
//!   underflow and gain-overdrive status bits
//!
//! # Example
//!
//! ```ignore
//! use plutoacq_rs::backend::sim::{SimFrontEnd, SimTransport};
//!
//! let front_end = SimFrontEnd::new();
//! let transport = SimTransport::new()
//!     .with_device("PlutoSDR (ad9361), serial=ABC123", "usb:1.2.5", front_end.clone());
//!
//! front_end.fail_refill_after(10);
//! ```

use super::iio_trait::{ContextInfo, IioBuffer, IioChannel, IioContext, IioDevice, IioTransport};
use super::registers;
use crate::error::{AcqError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Physical-layer device name exposed by the simulator
pub const SIM_PHY_DEVICE: &str = "ad9361-phy";

/// Streaming device name exposed by the simulator
pub const SIM_STREAM_DEVICE: &str = "cf-ad9361-lpc";

/// Streaming-core channels carrying sample rails
const STREAM_RAILS: [&str; 4] = ["voltage0", "voltage1", "voltage2", "voltage3"];

/// Sample words written into simulated buffers
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SimPattern {
    /// Every 16-bit word holds the same value
    Constant(i16),
    /// Words count up through the 12-bit ADC range and wrap
    #[default]
    Ramp,
}

/// One recorded attribute write
#[derive(Debug, Clone, PartialEq)]
pub struct AttrWrite {
    pub device: String,
    /// `None` for device-level debug attributes
    pub channel: Option<String>,
    pub attr: String,
    pub value: String,
}

#[derive(Debug, Default)]
struct SimState {
    debug_attrs: HashMap<(String, String), i64>,
    registers: HashMap<(String, u32), u32>,
    channel_attrs: HashMap<(String, String, bool, String), String>,
    writes: Vec<AttrWrite>,
    enabled: HashSet<(String, String)>,
    kernel_buffers: Option<usize>,
    buffer_samples: Option<usize>,
    live_buffers: usize,
    refills: u64,
    word_counter: u64,
    pattern: SimPattern,
    refill_delay: Option<Duration>,
    fail_open: bool,
    fail_attr: Option<String>,
    fail_buffer: bool,
    fail_refill_after: Option<u64>,
    underflow_on_fault: bool,
    unplugged: bool,
    missing_devices: HashSet<String>,
    missing_channels: HashSet<(String, String)>,
}

impl SimState {
    fn record(&mut self, device: &str, channel: Option<&str>, attr: &str, value: String) {
        self.writes.push(AttrWrite {
            device: device.to_string(),
            channel: channel.map(str::to_string),
            attr: attr.to_string(),
            value,
        });
    }

    fn check_attr(&self, attr: &str) -> Result<()> {
        if self.fail_attr.as_deref() == Some(attr) {
            return Err(AcqError::Hardware {
                operation: format!("write {}", attr),
                code: -22,
            });
        }
        Ok(())
    }

    fn dual_mode(&self) -> bool {
        self.debug_attrs
            .get(&(SIM_PHY_DEVICE.to_string(), registers::DUAL_MODE_ATTR.to_string()))
            .copied()
            == Some(1)
    }
}

/// Shared handle to one simulated front end
///
/// Cloning yields another handle to the same hardware state.
#[derive(Debug, Clone, Default)]
pub struct SimFrontEnd {
    state: Arc<Mutex<SimState>>,
}

impl SimFrontEnd {
    /// A single-channel (1RX/1TX) front end producing a ramp
    pub fn new() -> Self {
        let front_end = Self::default();
        front_end.set_dual_mode(false);
        front_end
    }

    /// A dual-channel (2RX/2TX) front end
    pub fn dual() -> Self {
        let front_end = Self::default();
        front_end.set_dual_mode(true);
        front_end
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the value reported by the duplex-mode debug attribute
    pub fn set_dual_mode(&self, dual: bool) {
        self.lock().debug_attrs.insert(
            (SIM_PHY_DEVICE.to_string(), registers::DUAL_MODE_ATTR.to_string()),
            i64::from(dual),
        );
    }

    /// Use a different sample pattern
    pub fn with_pattern(self, pattern: SimPattern) -> Self {
        self.lock().pattern = pattern;
        self
    }

    /// Sleep inside every refill to mimic a hardware-paced stream
    pub fn with_refill_delay(self, delay: Duration) -> Self {
        self.lock().refill_delay = Some(delay);
        self
    }

    // ==================== Fault injection ====================

    /// Make the next `open` of this front end fail
    pub fn fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    /// Make every write of the named attribute fail
    pub fn fail_attribute(&self, attr: &str) {
        self.lock().fail_attr = Some(attr.to_string());
    }

    /// Make buffer creation fail
    pub fn fail_buffer_creation(&self) {
        self.lock().fail_buffer = true;
    }

    /// Let `count` refills succeed, then fail every subsequent one
    pub fn fail_refill_after(&self, count: u64) {
        self.lock().fail_refill_after = Some(count);
    }

    /// Latch the underflow bit when a refill fails, as a DMA overrun does
    pub fn underflow_on_refill_failure(&self) {
        self.lock().underflow_on_fault = true;
    }

    /// Take the front end off (or put it back on) the bus
    ///
    /// An unplugged front end is left out of scans and cannot be opened.
    pub fn set_unplugged(&self, unplugged: bool) {
        self.lock().unplugged = unplugged;
    }

    /// Hide a device from the context
    pub fn remove_device(&self, name: &str) {
        self.lock().missing_devices.insert(name.to_string());
    }

    /// Hide a channel from a device
    pub fn remove_channel(&self, device: &str, channel: &str) {
        self.lock()
            .missing_channels
            .insert((device.to_string(), channel.to_string()));
    }

    /// Latch the underflow bit in the streaming core's status register
    pub fn inject_underflow(&self) {
        let mut state = self.lock();
        let key = (SIM_STREAM_DEVICE.to_string(), registers::STREAM_STATUS);
        let value = state.registers.get(&key).copied().unwrap_or(0);
        state
            .registers
            .insert(key, value | registers::STATUS_UNDERFLOW_BIT);
    }

    /// Set or clear the overdrive bit in a phy gain status register
    pub fn set_overgain(&self, register: u32, overdrive: bool) {
        let mut state = self.lock();
        let key = (SIM_PHY_DEVICE.to_string(), register);
        let value = state.registers.get(&key).copied().unwrap_or(0);
        let value = if overdrive { value | 1 } else { value & !1 };
        state.registers.insert(key, value);
    }

    /// Preload a register value
    pub fn set_register(&self, device: &str, address: u32, value: u32) {
        self.lock()
            .registers
            .insert((device.to_string(), address), value);
    }

    // ==================== Inspection ====================

    /// Last value written to a channel attribute
    pub fn channel_attr(&self, device: &str, channel: &str, output: bool, attr: &str) -> Option<String> {
        self.lock()
            .channel_attrs
            .get(&(
                device.to_string(),
                channel.to_string(),
                output,
                attr.to_string(),
            ))
            .cloned()
    }

    /// Current value of a debug attribute
    pub fn debug_attr(&self, device: &str, attr: &str) -> Option<i64> {
        self.lock()
            .debug_attrs
            .get(&(device.to_string(), attr.to_string()))
            .copied()
    }

    /// Current value of a register (unset registers read as zero)
    pub fn register(&self, device: &str, address: u32) -> u32 {
        self.lock()
            .registers
            .get(&(device.to_string(), address))
            .copied()
            .unwrap_or(0)
    }

    /// All attribute writes in the order they happened
    pub fn write_log(&self) -> Vec<AttrWrite> {
        self.lock().writes.clone()
    }

    /// Attribute names written to a channel, in order
    pub fn attrs_written_to(&self, channel: &str) -> Vec<String> {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.channel.as_deref() == Some(channel))
            .map(|w| w.attr.clone())
            .collect()
    }

    pub fn is_channel_enabled(&self, device: &str, channel: &str) -> bool {
        self.lock()
            .enabled
            .contains(&(device.to_string(), channel.to_string()))
    }

    pub fn kernel_buffers(&self) -> Option<usize> {
        self.lock().kernel_buffers
    }

    /// Sample count of the most recently created buffer
    pub fn buffer_samples(&self) -> Option<usize> {
        self.lock().buffer_samples
    }

    /// Number of buffers not yet destroyed
    pub fn live_buffers(&self) -> usize {
        self.lock().live_buffers
    }

    pub fn refill_count(&self) -> u64 {
        self.lock().refills
    }
}

/// Scan transport backed by simulated front ends
#[derive(Debug, Clone, Default)]
pub struct SimTransport {
    devices: Vec<(ContextInfo, SimFrontEnd)>,
    foreign: Vec<ContextInfo>,
    fail_scan: bool,
}

impl SimTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a front end under a description and endpoint
    pub fn with_device(
        mut self,
        description: impl Into<String>,
        uri: impl Into<String>,
        front_end: SimFrontEnd,
    ) -> Self {
        self.devices
            .push((ContextInfo::new(description, uri), front_end));
        self
    }

    /// Add a scan entry that cannot be opened (e.g. an unsupported board)
    pub fn with_foreign_context(mut self, description: impl Into<String>, uri: impl Into<String>) -> Self {
        self.foreign.push(ContextInfo::new(description, uri));
        self
    }

    /// Make every scan fail
    pub fn with_failing_scan(mut self) -> Self {
        self.fail_scan = true;
        self
    }

    /// Front end registered under an endpoint
    pub fn front_end(&self, uri: &str) -> Option<&SimFrontEnd> {
        self.devices
            .iter()
            .find(|(info, _)| info.uri == uri)
            .map(|(_, fe)| fe)
    }
}

impl IioTransport for SimTransport {
    fn scan(&self, _schemes: &str) -> Result<Vec<ContextInfo>> {
        if self.fail_scan {
            return Err(AcqError::Discovery("simulated scan failure".to_string()));
        }
        Ok(self
            .devices
            .iter()
            .filter(|(_, fe)| !fe.lock().unplugged)
            .map(|(info, _)| info.clone())
            .chain(self.foreign.iter().cloned())
            .collect())
    }

    fn open(&self, uri: &str) -> Result<Box<dyn IioContext>> {
        let front_end = self.front_end(uri).ok_or_else(|| AcqError::Hardware {
            operation: format!("open {}", uri),
            code: -19,
        })?;
        if front_end.lock().unplugged {
            return Err(AcqError::Hardware {
                operation: format!("open {}", uri),
                code: -19,
            });
        }
        if front_end.lock().fail_open {
            return Err(AcqError::Hardware {
                operation: format!("open {}", uri),
                code: -110,
            });
        }
        Ok(Box::new(SimContext {
            front_end: front_end.clone(),
        }))
    }
}

struct SimContext {
    front_end: SimFrontEnd,
}

impl IioContext for SimContext {
    fn find_device(&self, name: &str) -> Option<Arc<dyn IioDevice>> {
        if name != SIM_PHY_DEVICE && name != SIM_STREAM_DEVICE {
            return None;
        }
        if self.front_end.lock().missing_devices.contains(name) {
            return None;
        }
        Some(Arc::new(SimDevice {
            front_end: self.front_end.clone(),
            name: name.to_string(),
        }))
    }
}

struct SimDevice {
    front_end: SimFrontEnd,
    name: String,
}

impl SimDevice {
    fn has_channel(&self, id: &str, output: bool, dual: bool) -> bool {
        match (self.name.as_str(), output) {
            (SIM_PHY_DEVICE, false) => matches!(id, "voltage0" | "voltage1"),
            (SIM_PHY_DEVICE, true) => matches!(id, "altvoltage0" | "altvoltage1"),
            (SIM_STREAM_DEVICE, false) => match id {
                "voltage0" | "voltage1" => true,
                "voltage2" | "voltage3" => dual,
                _ => false,
            },
            _ => false,
        }
    }
}

impl IioDevice for SimDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_channel(&self, id: &str, output: bool) -> Option<Arc<dyn IioChannel>> {
        let state = self.front_end.lock();
        if state
            .missing_channels
            .contains(&(self.name.clone(), id.to_string()))
        {
            return None;
        }
        if !self.has_channel(id, output, state.dual_mode()) {
            return None;
        }
        drop(state);
        Some(Arc::new(SimChannel {
            front_end: self.front_end.clone(),
            device: self.name.clone(),
            id: id.to_string(),
            output,
        }))
    }

    fn debug_attr_read_i64(&self, attr: &str) -> Result<i64> {
        self.front_end
            .lock()
            .debug_attrs
            .get(&(self.name.clone(), attr.to_string()))
            .copied()
            .ok_or_else(|| AcqError::Hardware {
                operation: format!("read debug attr {}", attr),
                code: -2,
            })
    }

    fn debug_attr_write_i64(&self, attr: &str, value: i64) -> Result<()> {
        let mut state = self.front_end.lock();
        state.check_attr(attr)?;
        state
            .debug_attrs
            .insert((self.name.clone(), attr.to_string()), value);
        state.record(&self.name, None, attr, value.to_string());
        Ok(())
    }

    fn reg_read(&self, address: u32) -> Result<u32> {
        Ok(self
            .front_end
            .lock()
            .registers
            .get(&(self.name.clone(), address))
            .copied()
            .unwrap_or(0))
    }

    fn reg_write(&self, address: u32, value: u32) -> Result<()> {
        let mut state = self.front_end.lock();
        state.check_attr(&registers::register_attr_name(address))?;
        let key = (self.name.clone(), address);
        if self.name == SIM_STREAM_DEVICE && address == registers::STREAM_STATUS {
            // Status bits are write-one-to-clear
            let current = state.registers.get(&key).copied().unwrap_or(0);
            state.registers.insert(key, current & !value);
        } else {
            state.registers.insert(key, value);
        }
        Ok(())
    }

    fn set_kernel_buffers_count(&self, count: usize) -> Result<()> {
        self.front_end.lock().kernel_buffers = Some(count);
        Ok(())
    }

    fn create_buffer(&self, samples: usize) -> Result<Box<dyn IioBuffer>> {
        let mut state = self.front_end.lock();
        if state.fail_buffer {
            return Err(AcqError::Hardware {
                operation: "create buffer".to_string(),
                code: -12,
            });
        }
        let rails = STREAM_RAILS
            .iter()
            .filter(|rail| state.enabled.contains(&(self.name.clone(), rail.to_string())))
            .count();
        if rails == 0 || samples == 0 {
            return Err(AcqError::Hardware {
                operation: "create buffer".to_string(),
                code: -22,
            });
        }
        state.live_buffers += 1;
        state.buffer_samples = Some(samples);
        drop(state);

        Ok(Box::new(SimBuffer {
            front_end: self.front_end.clone(),
            data: vec![0u8; samples * rails * 2],
        }))
    }
}

struct SimChannel {
    front_end: SimFrontEnd,
    device: String,
    id: String,
    output: bool,
}

impl SimChannel {
    fn write(&self, attr: &str, value: String) -> Result<()> {
        let mut state = self.front_end.lock();
        state.check_attr(attr)?;
        state.channel_attrs.insert(
            (
                self.device.clone(),
                self.id.clone(),
                self.output,
                attr.to_string(),
            ),
            value.clone(),
        );
        state.record(&self.device, Some(&self.id), attr, value);
        Ok(())
    }
}

impl IioChannel for SimChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn attr_write_str(&self, attr: &str, value: &str) -> Result<()> {
        self.write(attr, value.to_string())
    }

    fn attr_write_i64(&self, attr: &str, value: i64) -> Result<()> {
        self.write(attr, value.to_string())
    }

    fn attr_write_f64(&self, attr: &str, value: f64) -> Result<()> {
        self.write(attr, value.to_string())
    }

    fn attr_write_bool(&self, attr: &str, value: bool) -> Result<()> {
        self.write(attr, if value { "1" } else { "0" }.to_string())
    }

    fn enable(&self) {
        self.front_end
            .lock()
            .enabled
            .insert((self.device.clone(), self.id.clone()));
    }

    fn disable(&self) {
        self.front_end
            .lock()
            .enabled
            .remove(&(self.device.clone(), self.id.clone()));
    }

    fn is_enabled(&self) -> bool {
        self.front_end
            .lock()
            .enabled
            .contains(&(self.device.clone(), self.id.clone()))
    }
}

struct SimBuffer {
    front_end: SimFrontEnd,
    data: Vec<u8>,
}

impl IioBuffer for SimBuffer {
    fn refill(&mut self) -> Result<usize> {
        let delay = {
            let mut state = self.front_end.lock();
            state.refills += 1;
            if let Some(limit) = state.fail_refill_after {
                if state.refills > limit {
                    if state.underflow_on_fault {
                        let key = (SIM_STREAM_DEVICE.to_string(), registers::STREAM_STATUS);
                        let value = state.registers.get(&key).copied().unwrap_or(0);
                        state
                            .registers
                            .insert(key, value | registers::STATUS_UNDERFLOW_BIT);
                    }
                    return Err(AcqError::Hardware {
                        operation: "refill".to_string(),
                        code: -5,
                    });
                }
            }

            let pattern = state.pattern;
            let mut counter = state.word_counter;
            for word in self.data.chunks_exact_mut(2) {
                let value = match pattern {
                    SimPattern::Constant(v) => v,
                    SimPattern::Ramp => ((counter % 4096) as i16) - 2048,
                };
                word.copy_from_slice(&value.to_le_bytes());
                counter = counter.wrapping_add(1);
            }
            state.word_counter = counter;
            state.refill_delay
        };

        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        Ok(self.data.len())
    }

    fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for SimBuffer {
    fn drop(&mut self) {
        let mut state = self.front_end.lock();
        state.live_buffers = state.live_buffers.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_sim() -> (SimFrontEnd, Box<dyn IioContext>) {
        let fe = SimFrontEnd::new();
        let transport = SimTransport::new().with_device("PlutoSDR", "usb:1.2.5", fe.clone());
        let ctx = transport.open("usb:1.2.5").unwrap();
        (fe, ctx)
    }

    #[test]
    fn test_scan_lists_all_contexts() {
        let transport = SimTransport::new()
            .with_device("PlutoSDR", "usb:1", SimFrontEnd::new())
            .with_foreign_context("Some other board", "usb:2");
        let infos = transport.scan("usb:ip").unwrap();
        assert_eq!(infos.len(), 2);
        assert!(transport.open("usb:2").is_err());
    }

    #[test]
    fn test_status_register_is_write_one_to_clear() {
        let (fe, ctx) = open_sim();
        let dev = ctx.find_device(SIM_STREAM_DEVICE).unwrap();

        fe.inject_underflow();
        let value = dev.reg_read(registers::STREAM_STATUS).unwrap();
        assert_ne!(value & registers::STATUS_UNDERFLOW_BIT, 0);

        dev.reg_write(registers::STREAM_STATUS, value).unwrap();
        assert_eq!(fe.register(SIM_STREAM_DEVICE, registers::STREAM_STATUS), 0);
    }

    #[test]
    fn test_dual_mode_exposes_second_pair() {
        let fe = SimFrontEnd::dual();
        let transport = SimTransport::new().with_device("PlutoSDR", "usb:1", fe);
        let ctx = transport.open("usb:1").unwrap();
        let dev = ctx.find_device(SIM_STREAM_DEVICE).unwrap();
        assert!(dev.find_channel("voltage2", false).is_some());

        let (_, single_ctx) = open_sim();
        let single_dev = single_ctx.find_device(SIM_STREAM_DEVICE).unwrap();
        assert!(single_dev.find_channel("voltage2", false).is_none());
    }

    #[test]
    fn test_buffer_fills_constant_pattern() {
        let fe = SimFrontEnd::new().with_pattern(SimPattern::Constant(1024));
        let transport = SimTransport::new().with_device("PlutoSDR", "usb:1", fe.clone());
        let ctx = transport.open("usb:1").unwrap();
        let dev = ctx.find_device(SIM_STREAM_DEVICE).unwrap();
        dev.find_channel("voltage0", false).unwrap().enable();
        dev.find_channel("voltage1", false).unwrap().enable();

        let mut buffer = dev.create_buffer(16).unwrap();
        assert_eq!(fe.live_buffers(), 1);
        assert_eq!(buffer.refill().unwrap(), 16 * 4);
        assert_eq!(&buffer.as_bytes()[..2], &1024i16.to_le_bytes());

        drop(buffer);
        assert_eq!(fe.live_buffers(), 0);
    }

    #[test]
    fn test_refill_failure_injection() {
        let (fe, ctx) = open_sim();
        let dev = ctx.find_device(SIM_STREAM_DEVICE).unwrap();
        dev.find_channel("voltage0", false).unwrap().enable();
        let mut buffer = dev.create_buffer(8).unwrap();

        fe.fail_refill_after(1);
        fe.underflow_on_refill_failure();
        assert!(buffer.refill().is_ok());
        assert_eq!(fe.register(SIM_STREAM_DEVICE, registers::STREAM_STATUS), 0);
        assert!(buffer.refill().is_err());
        assert_ne!(
            fe.register(SIM_STREAM_DEVICE, registers::STREAM_STATUS) & registers::STATUS_UNDERFLOW_BIT,
            0
        );
    }

    #[test]
    fn test_unplugged_front_end_is_hidden() {
        let fe = SimFrontEnd::new();
        let transport = SimTransport::new()
            .with_device("PlutoSDR", "usb:1", fe.clone())
            .with_device("ANTSDR", "usb:2", SimFrontEnd::new());

        fe.set_unplugged(true);
        let infos = transport.scan("usb:ip").unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].uri, "usb:2");
        assert!(transport.open("usb:1").is_err());

        fe.set_unplugged(false);
        assert_eq!(transport.scan("usb:ip").unwrap().len(), 2);
    }

    #[test]
    fn test_attribute_failure_injection() {
        let (fe, ctx) = open_sim();
        let phy = ctx.find_device(SIM_PHY_DEVICE).unwrap();
        let chan = phy.find_channel("voltage0", false).unwrap();

        fe.fail_attribute("rf_bandwidth");
        assert!(chan.attr_write_i64("rf_bandwidth", 1).is_err());
        assert!(chan.attr_write_i64("sampling_frequency", 1).is_ok());
        assert_eq!(fe.attrs_written_to("voltage0"), vec!["sampling_frequency"]);
    }
}
