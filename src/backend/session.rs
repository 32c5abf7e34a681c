//! Front-end session
//!
//! Owns the live connection to one device and applies the session
//! configuration to it. The configuration is always kept up to date; while
//! the link is closed, setters only change the pending values and
//! [`FrontEndSession::configure_front_end`] applies them on the next start.
//!
//! # Live vs idle-only fields
//!
//! | Field          | While streaming                                  |
//! |----------------|--------------------------------------------------|
//! | frequency      | written to the RX LO                             |
//! | gain, mode     | written to the RX channel                        |
//! | bandwidth      | written to the RX channel                        |
//! | RF port        | 1RX/1TX: register + debug attribute; 2RX/2TX: restart |
//! | sample rate    | restart                                          |
//! | sample format  | restart                                          |

use super::iio_trait::{IioChannel, IioContext, IioDevice, IioTransport};
use super::registers::{self, StreamRoute};
use crate::catalog::CapabilityCatalog;
use crate::config::{ConfigField, DeviceSettings, FrontEndSettings};
use crate::error::{AcqError, Result};
use crate::types::{DuplexMode, GainMode, RfPort, SampleFormat};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lowest accepted gain in dB
pub const MIN_GAIN: f32 = -1.0;

/// Highest accepted gain in dB
pub const MAX_GAIN: f32 = 73.0;

/// RX local oscillator on the phy
const RX_LO_CHANNEL: &str = "altvoltage0";

/// TX local oscillator on the phy
const TX_LO_CHANNEL: &str = "altvoltage1";

/// Everything needed to configure a front end for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Connection endpoint
    pub uri: String,
    /// RX LO frequency in Hz
    pub center_frequency: f64,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Analog RX bandwidth in Hz, 0 = automatic
    pub bandwidth: u32,
    pub gain_mode: GainMode,
    /// Manual gain in dB, -1 = mode default
    pub gain: f32,
    pub rf_port: RfPort,
    pub sample_format: SampleFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            center_frequency: crate::config::DEFAULT_CENTER_FREQUENCY,
            sample_rate: 4_000_000,
            bandwidth: 0,
            gain_mode: GainMode::Manual,
            gain: MIN_GAIN,
            rf_port: RfPort::Rx1,
            sample_format: SampleFormat::Cs16,
        }
    }
}

impl SessionConfig {
    /// Build a configuration from stored settings
    ///
    /// Missing fields take their defaults; stored values outside the
    /// catalog fall back to the first catalog entry.
    pub fn from_settings(
        uri: impl Into<String>,
        stored: &DeviceSettings,
        catalog: &CapabilityCatalog,
        center_frequency: f64,
    ) -> Self {
        let defaults = Self::default();
        Self {
            uri: uri.into(),
            center_frequency,
            sample_rate: catalog
                .sample_rate_or_default(stored.samplerate.unwrap_or(defaults.sample_rate)),
            bandwidth: catalog.bandwidth_or_default(stored.bandwidth.unwrap_or(defaults.bandwidth)),
            gain_mode: stored
                .gain_mode
                .as_deref()
                .map(|key| catalog.gain_mode_or_default(key))
                .unwrap_or(defaults.gain_mode),
            gain: clamp_gain(stored.gain.unwrap_or(defaults.gain)),
            rf_port: stored
                .rfinput
                .as_deref()
                .map(|key| catalog.rf_port_or_default(key))
                .unwrap_or(defaults.rf_port),
            sample_format: stored
                .iqmode
                .as_deref()
                .map(|key| catalog.sample_format_or_default(key))
                .unwrap_or(defaults.sample_format),
        }
    }

    /// Bandwidth actually written to the hardware
    ///
    /// An explicit bandwidth is used as-is; automatic bandwidth follows the
    /// sample rate up to the hardware ceiling.
    pub fn effective_bandwidth(&self, max_bandwidth: u32) -> u32 {
        if self.bandwidth > 0 {
            self.bandwidth
        } else {
            self.sample_rate.min(max_bandwidth)
        }
    }
}

/// Limit a gain value to the accepted range
pub fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        return MIN_GAIN;
    }
    gain.clamp(MIN_GAIN, MAX_GAIN)
}

/// Whether changing this field while streaming needs a stop/start cycle
///
/// RF port changes are decided by [`FrontEndSession::apply_rf_port`], since
/// the answer depends on the duplex mode.
pub fn requires_restart(field: &ConfigField) -> bool {
    matches!(field, ConfigField::SampleRate(_) | ConfigField::SampleFormat(_))
}

/// Outcome of an RF port change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortChange {
    /// The link is closed; the port is used on the next start
    Pending,
    /// The port was switched on the running link
    Applied,
    /// The running link must be restarted to switch ports
    RequiresRestart,
}

/// An open context with its two sub-devices
///
/// Dropping the handle releases the context.
pub struct LinkHandle {
    uri: String,
    phy: Arc<dyn IioDevice>,
    stream: Arc<dyn IioDevice>,
    rx_channel: Option<Arc<dyn IioChannel>>,
    rx_lo: Option<Arc<dyn IioChannel>>,
    duplex: DuplexMode,
    // Declared last so the device handles go first
    _context: Box<dyn IioContext>,
}

impl LinkHandle {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Physical-layer device
    pub fn phy(&self) -> &Arc<dyn IioDevice> {
        &self.phy
    }

    /// Streaming device
    pub fn stream_device(&self) -> &Arc<dyn IioDevice> {
        &self.stream
    }

    /// Duplex mode read during the last configuration
    pub fn duplex(&self) -> DuplexMode {
        self.duplex
    }

    /// Channel and register routing for a port under the current duplex mode
    pub fn route(&self, port: RfPort) -> StreamRoute {
        StreamRoute::resolve(self.duplex, port)
    }
}

impl std::fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkHandle")
            .field("uri", &self.uri)
            .field("phy", &self.phy.name())
            .field("stream", &self.stream.name())
            .field("duplex", &self.duplex)
            .field("configured", &self.rx_channel.is_some())
            .finish()
    }
}

/// Live connection to one front end plus its pending configuration
pub struct FrontEndSession {
    transport: Arc<dyn IioTransport>,
    settings: FrontEndSettings,
    config: SessionConfig,
    link: Option<LinkHandle>,
}

impl FrontEndSession {
    /// Create a closed session
    pub fn new(transport: Arc<dyn IioTransport>, settings: FrontEndSettings, config: SessionConfig) -> Self {
        Self {
            transport,
            settings,
            config,
            link: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Replace the pending configuration
    ///
    /// Only meaningful while closed; a live link keeps what was applied.
    pub fn set_config(&mut self, config: SessionConfig) {
        self.config = config;
    }

    pub fn settings(&self) -> &FrontEndSettings {
        &self.settings
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// The open link, if any
    pub fn link(&self) -> Option<&LinkHandle> {
        self.link.as_ref()
    }

    /// Open the endpoint and look up both sub-devices
    ///
    /// Opening an already open session closes the previous link first.
    pub fn open(&mut self, uri: &str) -> Result<()> {
        self.close();
        self.config.uri = uri.to_string();

        let context = self.transport.open(uri).map_err(|e| {
            tracing::error!("Could not open front end ({}): {}", uri, e);
            AcqError::LinkUnavailable {
                uri: uri.to_string(),
            }
        })?;

        let phy = context
            .find_device(&self.settings.phy_device)
            .ok_or_else(|| {
                tracing::error!("Could not connect to {}", self.settings.phy_device);
                AcqError::DeviceMissing {
                    name: self.settings.phy_device.clone(),
                }
            })?;
        let stream = context
            .find_device(&self.settings.stream_device)
            .ok_or_else(|| {
                tracing::error!("Could not connect to {}", self.settings.stream_device);
                AcqError::DeviceMissing {
                    name: self.settings.stream_device.clone(),
                }
            })?;

        tracing::info!("Opened front end at {}", uri);
        self.link = Some(LinkHandle {
            uri: uri.to_string(),
            phy,
            stream,
            rx_channel: None,
            rx_lo: None,
            duplex: DuplexMode::Single,
            _context: context,
        });
        Ok(())
    }

    /// Apply the whole configuration to the open link
    ///
    /// Stops at the first failed write.
    pub fn configure_front_end(&mut self) -> Result<()> {
        let config = self.config.clone();
        let max_bandwidth = self.settings.max_bandwidth;
        let link = self.link.as_mut().ok_or(AcqError::NotOpen)?;
        let phy = link.phy.clone();

        let duplex = read_duplex(phy.as_ref())?;
        link.duplex = duplex;
        if duplex == DuplexMode::Single {
            select_single_mode_port(phy.as_ref(), config.rf_port)?;
        }
        tracing::info!("Front end in {} mode, input {}", duplex, config.rf_port);

        let rx_channel = find_channel(phy.as_ref(), registers::phy_rx_channel(duplex, config.rf_port), false)?;
        let rx_lo = find_channel(phy.as_ref(), RX_LO_CHANNEL, true)?;
        let tx_lo = find_channel(phy.as_ref(), TX_LO_CHANNEL, true)?;

        write_bool(tx_lo.as_ref(), "powerdown", true)?;
        write_bool(rx_lo.as_ref(), "powerdown", false)?;

        write_str(rx_channel.as_ref(), "rf_port_select", "A_BALANCED")?;
        write_i64(rx_lo.as_ref(), "frequency", config.center_frequency.round() as i64)?;
        write_i64(rx_channel.as_ref(), "sampling_frequency", i64::from(config.sample_rate))?;
        write_f64(rx_channel.as_ref(), "hardwaregain", f64::from(config.gain))?;
        write_str(rx_channel.as_ref(), "gain_control_mode", config.gain_mode.key())?;
        write_i64(
            rx_channel.as_ref(),
            "rf_bandwidth",
            i64::from(config.effective_bandwidth(max_bandwidth)),
        )?;

        link.rx_channel = Some(rx_channel);
        link.rx_lo = Some(rx_lo);
        Ok(())
    }

    /// Retune the RX LO (or just remember the frequency while closed)
    pub fn tune(&mut self, frequency: f64) -> Result<()> {
        self.config.center_frequency = frequency;
        if let Some(rx_lo) = self.link.as_ref().and_then(|l| l.rx_lo.as_ref()) {
            write_i64(rx_lo.as_ref(), "frequency", frequency.round() as i64)?;
        }
        Ok(())
    }

    /// Set the manual gain, clamped to the accepted range
    pub fn set_gain(&mut self, gain: f32) -> Result<()> {
        let gain = clamp_gain(gain);
        self.config.gain = gain;
        if let Some(rx) = self.rx_channel() {
            write_f64(rx.as_ref(), "hardwaregain", f64::from(gain))?;
        }
        Ok(())
    }

    pub fn set_gain_mode(&mut self, mode: GainMode) -> Result<()> {
        self.config.gain_mode = mode;
        if let Some(rx) = self.rx_channel() {
            write_str(rx.as_ref(), "gain_control_mode", mode.key())?;
        }
        Ok(())
    }

    /// Set the RX bandwidth (0 = automatic)
    pub fn set_bandwidth(&mut self, bandwidth: u32) -> Result<()> {
        self.config.bandwidth = bandwidth;
        if let Some(rx) = self.rx_channel() {
            let effective = self.config.effective_bandwidth(self.settings.max_bandwidth);
            write_i64(rx.as_ref(), "rf_bandwidth", i64::from(effective))?;
        }
        Ok(())
    }

    /// Change the pending sample rate (applied on the next configuration)
    pub fn set_sample_rate(&mut self, rate: u32) {
        self.config.sample_rate = rate;
    }

    /// Change the pending sample format (applied on the next start)
    pub fn set_sample_format(&mut self, format: SampleFormat) {
        self.config.sample_format = format;
    }

    /// Switch the RF input
    ///
    /// Re-reads the duplex mode from the hardware. In 1RX/1TX mode the port
    /// is switched in place; in 2RX/2TX mode the port decides which channel
    /// pair is streamed, so the caller has to restart the engine.
    pub fn apply_rf_port(&mut self, port: RfPort) -> Result<PortChange> {
        self.config.rf_port = port;
        let Some(link) = self.link.as_mut() else {
            return Ok(PortChange::Pending);
        };

        let duplex = read_duplex(link.phy.as_ref())?;
        link.duplex = duplex;
        match duplex {
            DuplexMode::Single => {
                select_single_mode_port(link.phy.as_ref(), port)?;
                tracing::info!("Switched RF input to {}", port);
                Ok(PortChange::Applied)
            }
            DuplexMode::Dual => Ok(PortChange::RequiresRestart),
        }
    }

    /// Release the link; safe to call repeatedly
    pub fn close(&mut self) {
        if let Some(link) = self.link.take() {
            tracing::info!("Closed front end at {}", link.uri);
        }
    }

    fn rx_channel(&self) -> Option<Arc<dyn IioChannel>> {
        self.link.as_ref().and_then(|l| l.rx_channel.clone())
    }
}

impl std::fmt::Debug for FrontEndSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontEndSession")
            .field("config", &self.config)
            .field("link", &self.link)
            .finish()
    }
}

impl Drop for FrontEndSession {
    fn drop(&mut self) {
        self.close();
    }
}

// ==================== Attribute helpers ====================

/// Read the duplex mode from the phy
pub fn read_duplex(phy: &dyn IioDevice) -> Result<DuplexMode> {
    phy.debug_attr_read_i64(registers::DUAL_MODE_ATTR)
        .map(DuplexMode::from_mode_flag)
        .map_err(|e| AcqError::attribute_read(registers::DUAL_MODE_ATTR, e))
}

/// Route `port` to the single RX path of a 1RX/1TX front end
///
/// Both the port-select register and the debug attribute must be written.
fn select_single_mode_port(phy: &dyn IioDevice, port: RfPort) -> Result<()> {
    let reg_name = registers::register_attr_name(registers::PORT_SELECT_REGISTER);
    let current = phy
        .reg_read(registers::PORT_SELECT_REGISTER)
        .map_err(|e| AcqError::attribute_read(&reg_name, e))?;
    phy.reg_write(
        registers::PORT_SELECT_REGISTER,
        registers::port_select_value(current, port),
    )
    .map_err(|e| AcqError::attribute_write(&reg_name, e))?;

    let rx_num = i64::from(port.index() + 1);
    phy.debug_attr_write_i64(registers::SINGLE_MODE_RX_NUM_ATTR, rx_num)
        .map_err(|e| AcqError::attribute_write(registers::SINGLE_MODE_RX_NUM_ATTR, e))
}

fn find_channel(device: &dyn IioDevice, id: &str, output: bool) -> Result<Arc<dyn IioChannel>> {
    device.find_channel(id, output).ok_or_else(|| {
        AcqError::ChannelAcquisition(format!("{} has no channel {}", device.name(), id))
    })
}

fn write_str(channel: &dyn IioChannel, attr: &str, value: &str) -> Result<()> {
    tracing::debug!("{}.{} = {}", channel.id(), attr, value);
    channel
        .attr_write_str(attr, value)
        .map_err(|e| AcqError::attribute_write(attr, e))
}

fn write_i64(channel: &dyn IioChannel, attr: &str, value: i64) -> Result<()> {
    tracing::debug!("{}.{} = {}", channel.id(), attr, value);
    channel
        .attr_write_i64(attr, value)
        .map_err(|e| AcqError::attribute_write(attr, e))
}

fn write_f64(channel: &dyn IioChannel, attr: &str, value: f64) -> Result<()> {
    tracing::debug!("{}.{} = {}", channel.id(), attr, value);
    channel
        .attr_write_f64(attr, value)
        .map_err(|e| AcqError::attribute_write(attr, e))
}

fn write_bool(channel: &dyn IioChannel, attr: &str, value: bool) -> Result<()> {
    tracing::debug!("{}.{} = {}", channel.id(), attr, value);
    channel
        .attr_write_bool(attr, value)
        .map_err(|e| AcqError::attribute_write(attr, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sim::{SimFrontEnd, SimTransport, SIM_PHY_DEVICE, SIM_STREAM_DEVICE};

    const URI: &str = "usb:1.2.5";

    fn session_for(front_end: &SimFrontEnd, config: SessionConfig) -> FrontEndSession {
        let transport = SimTransport::new().with_device("PlutoSDR", URI, front_end.clone());
        FrontEndSession::new(Arc::new(transport), FrontEndSettings::default(), config)
    }

    fn config() -> SessionConfig {
        SessionConfig {
            uri: URI.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_auto_bandwidth_follows_sample_rate() {
        let mut cfg = config();
        assert_eq!(cfg.effective_bandwidth(52_000_000), 4_000_000);
        cfg.sample_rate = 61_440_000;
        assert_eq!(cfg.effective_bandwidth(52_000_000), 52_000_000);
        cfg.bandwidth = 10_000_000;
        assert_eq!(cfg.effective_bandwidth(52_000_000), 10_000_000);
    }

    #[test]
    fn test_from_settings_applies_fallbacks() {
        let catalog = CapabilityCatalog::ad9361();
        let stored = DeviceSettings {
            samplerate: Some(4_100_000),
            gain_mode: Some("turbo".to_string()),
            gain: Some(99.0),
            rfinput: Some("rx2".to_string()),
            iqmode: Some("cs8".to_string()),
            ..Default::default()
        };
        let cfg = SessionConfig::from_settings(URI, &stored, &catalog, 433e6);
        assert_eq!(cfg.sample_rate, 2_500_000);
        assert_eq!(cfg.bandwidth, 0);
        assert_eq!(cfg.gain_mode, GainMode::Manual);
        assert_eq!(cfg.gain, MAX_GAIN);
        assert_eq!(cfg.rf_port, RfPort::Rx2);
        assert_eq!(cfg.sample_format, SampleFormat::Cs8);
        assert_eq!(cfg.center_frequency, 433e6);
    }

    #[test]
    fn test_open_missing_stream_device() {
        let fe = SimFrontEnd::new();
        fe.remove_device(SIM_STREAM_DEVICE);
        let mut session = session_for(&fe, config());

        let err = session.open(URI).unwrap_err();
        assert!(matches!(err, AcqError::DeviceMissing { ref name } if name == SIM_STREAM_DEVICE));
        assert!(!session.is_open());
    }

    #[test]
    fn test_open_unreachable_endpoint() {
        let fe = SimFrontEnd::new();
        fe.fail_open(true);
        let mut session = session_for(&fe, config());
        assert!(matches!(
            session.open(URI),
            Err(AcqError::LinkUnavailable { .. })
        ));
    }

    #[test]
    fn test_configure_writes_in_order() {
        let fe = SimFrontEnd::new();
        let mut session = session_for(&fe, config());
        session.open(URI).unwrap();
        session.configure_front_end().unwrap();

        assert_eq!(
            fe.attrs_written_to("voltage0"),
            vec![
                "rf_port_select",
                "sampling_frequency",
                "hardwaregain",
                "gain_control_mode",
                "rf_bandwidth"
            ]
        );
        assert_eq!(
            fe.channel_attr(SIM_PHY_DEVICE, "voltage0", false, "hardwaregain").as_deref(),
            Some("-1")
        );
        assert_eq!(
            fe.channel_attr(SIM_PHY_DEVICE, "voltage0", false, "rf_bandwidth").as_deref(),
            Some("4000000")
        );
        assert_eq!(
            fe.channel_attr(SIM_PHY_DEVICE, "altvoltage1", true, "powerdown").as_deref(),
            Some("1")
        );
        assert_eq!(
            fe.channel_attr(SIM_PHY_DEVICE, "altvoltage0", true, "frequency").as_deref(),
            Some("100000000")
        );
    }

    #[test]
    fn test_configure_manual_gain_is_written() {
        let fe = SimFrontEnd::new();
        let mut cfg = config();
        cfg.gain = 30.0;
        let mut session = session_for(&fe, cfg);
        session.open(URI).unwrap();
        session.configure_front_end().unwrap();

        assert_eq!(
            fe.channel_attr(SIM_PHY_DEVICE, "voltage0", false, "hardwaregain").as_deref(),
            Some("30")
        );
    }

    #[test]
    fn test_single_mode_port_select() {
        let fe = SimFrontEnd::new();
        fe.set_register(SIM_PHY_DEVICE, registers::PORT_SELECT_REGISTER, 0xC5);
        let mut cfg = config();
        cfg.rf_port = RfPort::Rx2;
        let mut session = session_for(&fe, cfg);
        session.open(URI).unwrap();
        session.configure_front_end().unwrap();

        assert_eq!(fe.register(SIM_PHY_DEVICE, registers::PORT_SELECT_REGISTER), 0x85);
        assert_eq!(fe.debug_attr(SIM_PHY_DEVICE, registers::SINGLE_MODE_RX_NUM_ATTR), Some(2));
        assert!(!fe.attrs_written_to("voltage0").is_empty());
    }

    #[test]
    fn test_dual_mode_rx2_uses_second_phy_channel() {
        let fe = SimFrontEnd::dual();
        let mut cfg = config();
        cfg.rf_port = RfPort::Rx2;
        let mut session = session_for(&fe, cfg);
        session.open(URI).unwrap();
        session.configure_front_end().unwrap();

        assert!(fe.attrs_written_to("voltage0").is_empty());
        assert!(fe.attrs_written_to("voltage1").contains(&"sampling_frequency".to_string()));
        assert_eq!(fe.debug_attr(SIM_PHY_DEVICE, registers::SINGLE_MODE_RX_NUM_ATTR), None);
        assert_eq!(session.link().map(|l| l.duplex()), Some(DuplexMode::Dual));
    }

    #[test]
    fn test_configure_stops_at_first_failure() {
        let fe = SimFrontEnd::new();
        fe.fail_attribute("sampling_frequency");
        let mut session = session_for(&fe, config());
        session.open(URI).unwrap();

        let err = session.configure_front_end().unwrap_err();
        assert!(matches!(err, AcqError::AttributeWrite { ref attribute, .. } if attribute == "sampling_frequency"));
        assert_eq!(fe.attrs_written_to("voltage0"), vec!["rf_port_select"]);
    }

    #[test]
    fn test_tune_while_closed_only_updates_config() {
        let fe = SimFrontEnd::new();
        let mut session = session_for(&fe, config());
        session.tune(145_500_000.0).unwrap();

        assert_eq!(session.config().center_frequency, 145_500_000.0);
        assert!(fe.write_log().is_empty());
    }

    #[test]
    fn test_live_adjustments() {
        let fe = SimFrontEnd::new();
        let mut session = session_for(&fe, config());
        session.open(URI).unwrap();
        session.configure_front_end().unwrap();

        session.tune(433_920_000.4).unwrap();
        session.set_gain(20.0).unwrap();
        session.set_gain_mode(GainMode::FastAttack).unwrap();
        session.set_bandwidth(5_000_000).unwrap();

        let attr = |chan: &str, output: bool, name: &str| fe.channel_attr(SIM_PHY_DEVICE, chan, output, name);
        assert_eq!(attr("altvoltage0", true, "frequency").as_deref(), Some("433920000"));
        assert_eq!(attr("voltage0", false, "hardwaregain").as_deref(), Some("20"));
        assert_eq!(attr("voltage0", false, "gain_control_mode").as_deref(), Some("fast_attack"));
        assert_eq!(attr("voltage0", false, "rf_bandwidth").as_deref(), Some("5000000"));
    }

    #[test]
    fn test_lowest_gain_reaches_hardware() {
        let fe = SimFrontEnd::new();
        let mut session = session_for(&fe, config());
        session.open(URI).unwrap();
        session.configure_front_end().unwrap();

        session.set_gain(30.0).unwrap();
        session.set_gain(MIN_GAIN).unwrap();

        assert_eq!(session.config().gain, MIN_GAIN);
        assert_eq!(
            fe.channel_attr(SIM_PHY_DEVICE, "voltage0", false, "hardwaregain").as_deref(),
            Some("-1")
        );
    }

    #[test]
    fn test_rf_port_change_by_duplex_mode() {
        let single = SimFrontEnd::new();
        let mut session = session_for(&single, config());
        assert_eq!(session.apply_rf_port(RfPort::Rx2).unwrap(), PortChange::Pending);
        session.open(URI).unwrap();
        session.configure_front_end().unwrap();
        assert_eq!(session.apply_rf_port(RfPort::Rx1).unwrap(), PortChange::Applied);
        assert_eq!(single.debug_attr(SIM_PHY_DEVICE, registers::SINGLE_MODE_RX_NUM_ATTR), Some(1));

        let dual = SimFrontEnd::dual();
        let mut session = session_for(&dual, config());
        session.open(URI).unwrap();
        session.configure_front_end().unwrap();
        assert_eq!(session.apply_rf_port(RfPort::Rx2).unwrap(), PortChange::RequiresRestart);
    }

    #[test]
    fn test_close_is_idempotent() {
        let fe = SimFrontEnd::new();
        let mut session = session_for(&fe, config());
        session.open(URI).unwrap();
        session.close();
        session.close();
        assert!(!session.is_open());
    }

    #[test]
    fn test_gain_clamping() {
        assert_eq!(clamp_gain(-5.0), MIN_GAIN);
        assert_eq!(clamp_gain(100.0), MAX_GAIN);
        assert_eq!(clamp_gain(f32::NAN), MIN_GAIN);
        assert_eq!(clamp_gain(12.5), 12.5);
    }

    #[test]
    fn test_restart_classification() {
        assert!(requires_restart(&ConfigField::SampleRate(8_000_000)));
        assert!(requires_restart(&ConfigField::SampleFormat(SampleFormat::Cs8)));
        assert!(!requires_restart(&ConfigField::Gain(10.0)));
        assert!(!requires_restart(&ConfigField::RfPort(RfPort::Rx2)));
    }
}
