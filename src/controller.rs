//! Pipeline controller
//!
//! Orchestrates the acquisition lifecycle and serializes configuration
//! changes against the running engine:
//!
//! ```text
//! Idle ──start──▶ Configuring ──engine live──▶ Streaming ──stop / fault──▶ Idle
//! ```
//!
//! Every user-driven change is validated against the capability catalog,
//! persisted through the injected [`ConfigRepository`] and then either
//! written to the running hardware or, for structural changes (sample rate,
//! sample format, RF port in 2RX/2TX mode), applied through a stop/start
//! cycle.
//!
//! # Example
//!
//! ```ignore
//! use plutoacq_rs::controller::PipelineController;
//!
//! let (mut controller, blocks) = PipelineController::new(transport, store, config);
//! controller.refresh_devices();
//! controller.select_device("PlutoSDR")?;
//! controller.start()?;
//!
//! for block in blocks.drain() {
//!     process(&block.data);
//! }
//! ```

use crate::backend::iio_trait::IioTransport;
use crate::backend::registry::{DeviceDescriptor, DeviceRegistry};
use crate::backend::session::{clamp_gain, FrontEndSession, PortChange, SessionConfig};
use crate::catalog::CapabilityCatalog;
use crate::config::{AppConfig, ConfigField, ConfigRepository};
use crate::engine::{output_channel, AcquisitionEngine, BlockReceiver, BlockSender, EngineStats, StreamExit};
use crate::error::{AcqError, Result};
use crate::types::{format_hz, GainMode, HealthSnapshot, PipelineState, RfPort, SampleFormat};
use std::sync::Arc;

/// Snapshot shown by the periodic render hook
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub state: PipelineState,
    /// Description of the selected device
    pub device: Option<String>,
    pub sample_rate: u32,
    pub health: HealthSnapshot,
    pub stats: EngineStats,
    /// Last start failure or stream fault
    pub last_error: Option<String>,
}

impl StatusReport {
    pub fn buffer_text(&self) -> &'static str {
        self.health.buffer_text()
    }

    pub fn gain_text(&self) -> &'static str {
        self.health.gain_text()
    }
}

impl std::fmt::Display for StatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | {} @ {} | {} | {} | blocks {} underflows {} overgains {}",
            self.state,
            self.device.as_deref().unwrap_or("no device"),
            format_hz(f64::from(self.sample_rate)),
            self.buffer_text(),
            self.gain_text(),
            self.stats.blocks_published,
            self.stats.underflow_events,
            self.stats.overgain_events,
        )?;
        if let Some(error) = &self.last_error {
            write!(f, " | {}", error)?;
        }
        Ok(())
    }
}

/// Callbacks a control surface drives the source through
pub trait SourceControl {
    /// Select a device; returns the sample rate it will stream at
    fn on_select(&mut self, description: &str) -> Result<u32>;
    fn on_start(&mut self) -> Result<()>;
    fn on_stop(&mut self);
    fn on_tune(&mut self, frequency: f64) -> Result<()>;
    /// Periodic status refresh
    fn on_render(&mut self) -> StatusReport;
    fn on_sample_rate(&mut self, rate: u32) -> Result<()>;
    fn on_bandwidth(&mut self, bandwidth: u32) -> Result<()>;
    fn on_gain_mode(&mut self, mode: GainMode) -> Result<()>;
    fn on_gain(&mut self, gain: f32) -> Result<()>;
    fn on_rf_port(&mut self, port: RfPort) -> Result<()>;
    fn on_sample_format(&mut self, format: SampleFormat) -> Result<()>;
}

/// Owns the registry, the session and the engine of one source
pub struct PipelineController {
    transport: Arc<dyn IioTransport>,
    store: Arc<dyn ConfigRepository>,
    config: AppConfig,
    catalog: CapabilityCatalog,
    registry: DeviceRegistry,
    session: FrontEndSession,
    engine: AcquisitionEngine,
    output: BlockSender,
    selected: Option<String>,
    state: PipelineState,
    last_error: Option<String>,
}

impl PipelineController {
    /// Create a controller and the consumer end of its output channel
    pub fn new(
        transport: Arc<dyn IioTransport>,
        store: Arc<dyn ConfigRepository>,
        config: AppConfig,
    ) -> (Self, BlockReceiver) {
        let (output, receiver) = output_channel(config.stream.channel_depth);
        let session_config = SessionConfig {
            center_frequency: config.front_end.default_frequency,
            ..Default::default()
        };

        let controller = Self {
            registry: DeviceRegistry::new(config.discovery.clone()),
            session: FrontEndSession::new(transport.clone(), config.front_end.clone(), session_config),
            catalog: CapabilityCatalog::ad9361(),
            engine: AcquisitionEngine::new(),
            transport,
            store,
            config,
            output,
            selected: None,
            state: PipelineState::Idle,
            last_error: None,
        };
        (controller, receiver)
    }

    // ==================== Queries ====================

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == PipelineState::Streaming
    }

    pub fn health(&self) -> HealthSnapshot {
        self.engine.health()
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }

    /// Pending or applied session configuration
    pub fn config(&self) -> &SessionConfig {
        self.session.config()
    }

    pub fn app_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn catalog(&self) -> &CapabilityCatalog {
        &self.catalog
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        self.registry.devices()
    }

    pub fn selected_device(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    // ==================== Devices ====================

    /// Rescan for devices; returns how many were found
    ///
    /// A previous selection is resolved again against the new list, which
    /// falls back to the first device when it went away.
    pub fn refresh_devices(&mut self) -> usize {
        let count = self.registry.refresh(self.transport.as_ref());
        tracing::info!("Found {} supported device(s)", count);

        if let Some(previous) = self.selected.clone() {
            if let Err(e) = self.select_device(&previous) {
                tracing::warn!("No device left to select: {}", e);
            }
        }
        count
    }

    /// Select the device remembered by the store (or the first one)
    pub fn select_last_device(&mut self) -> Result<u32> {
        let description = self.store.selected_device().unwrap_or_default();
        self.select_device(&description)
    }

    /// Select a device and load its stored settings
    ///
    /// Stops any running acquisition first. An unknown description falls
    /// back to the first device in the registry. Returns the sample rate
    /// the device will stream at.
    pub fn select_device(&mut self, requested: &str) -> Result<u32> {
        self.stop();

        let (description, uri) = match self.registry.resolve(requested) {
            Ok(device) => (device.description.clone(), device.uri.clone()),
            Err(e) => {
                self.selected = None;
                return Err(e);
            }
        };
        if description != requested {
            tracing::info!("Device '{}' not available, selecting '{}'", requested, description);
        }

        let stored = self.store.get(&description);
        let session_config = SessionConfig::from_settings(
            uri,
            &stored,
            &self.catalog,
            self.session.config().center_frequency,
        );
        let sample_rate = session_config.sample_rate;
        self.session.set_config(session_config);

        if let Err(e) = self.store.set_selected_device(&description) {
            tracing::warn!("Failed to remember selected device: {}", e);
        }
        tracing::info!("Selected device {}", description);
        self.selected = Some(description);
        Ok(sample_rate)
    }

    // ==================== Lifecycle ====================

    /// Open, configure and start streaming from the selected device
    ///
    /// Starting while streaming does nothing. On failure the link is
    /// released and the controller is back in `Idle`.
    pub fn start(&mut self) -> Result<()> {
        self.poll();
        if self.is_streaming() {
            tracing::debug!("Already streaming, ignoring start");
            return Ok(());
        }
        let description = self.selected.clone().ok_or(AcqError::NoDevice)?;
        if !self.devices().iter().any(|d| d.description == description) {
            return Err(AcqError::DeviceUnavailable(description));
        }

        self.state = PipelineState::Configuring;
        match self.open_and_start() {
            Ok(()) => {
                self.state = PipelineState::Streaming;
                self.last_error = None;
                tracing::info!("Streaming from {}", description);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to start {}: {}", description, e);
                self.session.close();
                self.state = PipelineState::Idle;
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn open_and_start(&mut self) -> Result<()> {
        let uri = self.session.config().uri.clone();
        self.session.open(&uri)?;
        self.session.configure_front_end()?;
        let link = self.session.link().ok_or(AcqError::NotOpen)?;
        self.engine.start(
            link,
            self.session.config(),
            &self.config.stream,
            self.output.clone(),
        )
    }

    /// Stop streaming and release the link; safe to call repeatedly
    pub fn stop(&mut self) {
        if let Some(exit) = self.engine.stop() {
            self.record_exit(exit);
        }
        self.session.close();
        if self.state != PipelineState::Idle {
            tracing::info!("Stopped");
        }
        self.state = PipelineState::Idle;
    }

    /// Observe a worker that ended on its own
    ///
    /// Returns true when the pipeline went back to `Idle`.
    pub fn poll(&mut self) -> bool {
        match self.engine.poll_exit() {
            Some(exit) => {
                self.record_exit(exit);
                self.session.close();
                self.state = PipelineState::Idle;
                true
            }
            None => false,
        }
    }

    fn record_exit(&mut self, exit: StreamExit) {
        match exit {
            StreamExit::Stopped => {}
            StreamExit::ConsumerClosed => {
                tracing::warn!("Consumer went away, acquisition ended");
            }
            StreamExit::Fault(e) => {
                tracing::error!("Acquisition ended: {}", e);
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Reap worker exits and build the current status
    pub fn render(&mut self) -> StatusReport {
        self.poll();
        StatusReport {
            state: self.state,
            device: self.selected.clone(),
            sample_rate: self.session.config().sample_rate,
            health: self.engine.health(),
            stats: self.engine.stats(),
            last_error: self.last_error.clone(),
        }
    }

    /// Retune; while idle only the pending configuration changes
    pub fn tune(&mut self, frequency: f64) -> Result<()> {
        self.session.tune(frequency)
    }

    fn restart(&mut self) -> Result<()> {
        tracing::info!("Restarting acquisition to apply new settings");
        self.stop();
        self.start()
    }

    // ==================== Settings ====================

    fn persist(&self, field: ConfigField) {
        let Some(device) = &self.selected else {
            return;
        };
        if let Err(e) = self.store.put(device, field) {
            tracing::warn!("Failed to save {:?}: {}", field, e);
        }
    }

    /// Change the sample rate (restarts a running stream)
    pub fn set_sample_rate(&mut self, rate: u32) -> Result<()> {
        if !self.catalog.is_valid_sample_rate(rate) {
            return Err(AcqError::UnsupportedValue {
                field: "sample rate",
                value: rate.to_string(),
            });
        }
        self.persist(ConfigField::SampleRate(rate));

        let was_streaming = self.is_streaming();
        if was_streaming {
            self.stop();
        }
        self.session.set_sample_rate(rate);
        if was_streaming {
            self.start()?;
        }
        Ok(())
    }

    /// Change the RX bandwidth (0 = automatic)
    pub fn set_bandwidth(&mut self, bandwidth: u32) -> Result<()> {
        if !self.catalog.is_valid_bandwidth(bandwidth) {
            return Err(AcqError::UnsupportedValue {
                field: "bandwidth",
                value: bandwidth.to_string(),
            });
        }
        self.persist(ConfigField::Bandwidth(bandwidth));
        self.session.set_bandwidth(bandwidth)
    }

    pub fn set_gain_mode(&mut self, mode: GainMode) -> Result<()> {
        if !self.catalog.gain_modes.value_exists(&mode) {
            return Err(AcqError::UnsupportedValue {
                field: "gain mode",
                value: mode.key().to_string(),
            });
        }
        self.persist(ConfigField::GainMode(mode));
        self.session.set_gain_mode(mode)
    }

    /// Change the manual gain, clamped to the accepted range
    pub fn set_gain(&mut self, gain: f32) -> Result<()> {
        let gain = clamp_gain(gain);
        self.persist(ConfigField::Gain(gain));
        self.session.set_gain(gain)
    }

    /// Switch the RF input, restarting when the channel pair changes
    pub fn set_rf_port(&mut self, port: RfPort) -> Result<()> {
        if !self.catalog.rf_ports.value_exists(&port) {
            return Err(AcqError::UnsupportedValue {
                field: "RF port",
                value: port.key().to_string(),
            });
        }
        self.persist(ConfigField::RfPort(port));

        match self.session.apply_rf_port(port)? {
            PortChange::RequiresRestart if self.is_streaming() => self.restart(),
            _ => Ok(()),
        }
    }

    /// Change the sample word format (restarts a running stream)
    pub fn set_sample_format(&mut self, format: SampleFormat) -> Result<()> {
        if !self.catalog.sample_formats.value_exists(&format) {
            return Err(AcqError::UnsupportedValue {
                field: "sample format",
                value: format.key().to_string(),
            });
        }
        self.persist(ConfigField::SampleFormat(format));

        let was_streaming = self.is_streaming();
        if was_streaming {
            self.stop();
        }
        self.session.set_sample_format(format);
        if was_streaming {
            self.start()?;
        }
        Ok(())
    }
}

impl SourceControl for PipelineController {
    fn on_select(&mut self, description: &str) -> Result<u32> {
        self.select_device(description)
    }

    fn on_start(&mut self) -> Result<()> {
        self.start()
    }

    fn on_stop(&mut self) {
        self.stop()
    }

    fn on_tune(&mut self, frequency: f64) -> Result<()> {
        self.tune(frequency)
    }

    fn on_render(&mut self) -> StatusReport {
        self.render()
    }

    fn on_sample_rate(&mut self, rate: u32) -> Result<()> {
        self.set_sample_rate(rate)
    }

    fn on_bandwidth(&mut self, bandwidth: u32) -> Result<()> {
        self.set_bandwidth(bandwidth)
    }

    fn on_gain_mode(&mut self, mode: GainMode) -> Result<()> {
        self.set_gain_mode(mode)
    }

    fn on_gain(&mut self, gain: f32) -> Result<()> {
        self.set_gain(gain)
    }

    fn on_rf_port(&mut self, port: RfPort) -> Result<()> {
        self.set_rf_port(port)
    }

    fn on_sample_format(&mut self, format: SampleFormat) -> Result<()> {
        self.set_sample_format(format)
    }
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("state", &self.state)
            .field("selected", &self.selected)
            .field("session", &self.session)
            .field("engine", &self.engine)
            .finish()
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sim::{SimFrontEnd, SimTransport, SIM_PHY_DEVICE};
    use crate::config::store::MockConfigRepository;
    use crate::config::{DeviceSettings, MemoryConfigStore};
    use mockall::predicate::eq;
    use std::time::Duration;

    const DEVICE_A: &str = "PlutoSDR (ad9361), serial=AAAA";
    const DEVICE_B: &str = "PlutoSDR (ad9361), serial=BBBB";

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.stream.block_size = 256;
        config.stream.channel_depth = 4;
        config
    }

    fn two_devices() -> (SimTransport, SimFrontEnd, SimFrontEnd) {
        let a = SimFrontEnd::new();
        let b = SimFrontEnd::new();
        let transport = SimTransport::new()
            .with_device(DEVICE_A, "usb:1.2.5", a.clone())
            .with_device(DEVICE_B, "usb:1.3.5", b.clone());
        (transport, a, b)
    }

    fn quiet_store() -> MockConfigRepository {
        let mut store = MockConfigRepository::new();
        store.expect_get().returning(|_| DeviceSettings::default());
        store.expect_set_selected_device().returning(|_| Ok(()));
        store.expect_selected_device().returning(|| None);
        store.expect_put().returning(|_, _| Ok(()));
        store
    }

    #[test]
    fn test_select_falls_back_to_first_device() {
        let (transport, _, _) = two_devices();
        let mut store = MockConfigRepository::new();
        store
            .expect_get()
            .with(eq(DEVICE_A))
            .times(1)
            .returning(|_| DeviceSettings {
                samplerate: Some(8_000_000),
                ..Default::default()
            });
        store
            .expect_set_selected_device()
            .with(eq(DEVICE_A))
            .times(1)
            .returning(|_| Ok(()));

        let (mut controller, _rx) =
            PipelineController::new(Arc::new(transport), Arc::new(store), test_config());
        controller.refresh_devices();

        let rate = controller.select_device("Missing device").unwrap();
        assert_eq!(rate, 8_000_000);
        assert_eq!(controller.selected_device(), Some(DEVICE_A));
        assert_eq!(controller.config().uri, "usb:1.2.5");
    }

    #[test]
    fn test_select_with_empty_registry() {
        let (mut controller, _rx) = PipelineController::new(
            Arc::new(SimTransport::new()),
            Arc::new(quiet_store()),
            test_config(),
        );
        controller.refresh_devices();
        assert!(matches!(controller.select_device(DEVICE_A), Err(AcqError::NotFound)));
        assert!(matches!(controller.start(), Err(AcqError::NoDevice)));
    }

    #[test]
    fn test_unknown_stored_gain_mode_is_manual() {
        let (transport, _, _) = two_devices();
        let store = MemoryConfigStore::new().with_device(
            DEVICE_B,
            DeviceSettings {
                gain_mode: Some("turbo".to_string()),
                ..Default::default()
            },
        );
        let (mut controller, _rx) =
            PipelineController::new(Arc::new(transport), Arc::new(store), test_config());
        controller.refresh_devices();
        controller.select_device(DEVICE_B).unwrap();
        assert_eq!(controller.config().gain_mode, GainMode::Manual);
    }

    #[test]
    fn test_start_and_stop() {
        let (transport, a, _) = two_devices();
        let (mut controller, rx) =
            PipelineController::new(Arc::new(transport), Arc::new(quiet_store()), test_config());
        controller.refresh_devices();
        controller.select_device(DEVICE_A).unwrap();

        controller.start().unwrap();
        assert_eq!(controller.state(), PipelineState::Streaming);
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_some());

        // Second start is a no-op
        controller.start().unwrap();
        assert_eq!(a.live_buffers(), 1);

        controller.stop();
        controller.stop();
        assert_eq!(controller.state(), PipelineState::Idle);
        assert_eq!(a.live_buffers(), 0);
    }

    #[test]
    fn test_start_failure_returns_to_idle() {
        let (transport, a, _) = two_devices();
        a.fail_attribute("sampling_frequency");
        let (mut controller, _rx) =
            PipelineController::new(Arc::new(transport), Arc::new(quiet_store()), test_config());
        controller.refresh_devices();
        controller.select_device(DEVICE_A).unwrap();

        let err = controller.start().unwrap_err();
        assert!(matches!(err, AcqError::AttributeWrite { .. }));
        assert_eq!(controller.state(), PipelineState::Idle);
        assert!(controller.last_error().is_some());
    }

    #[test]
    fn test_setters_persist_changes() {
        let (transport, _, _) = two_devices();
        let mut store = MockConfigRepository::new();
        store.expect_get().returning(|_| DeviceSettings::default());
        store.expect_set_selected_device().returning(|_| Ok(()));
        store
            .expect_put()
            .with(eq(DEVICE_A), eq(ConfigField::Bandwidth(5_000_000)))
            .times(1)
            .returning(|_, _| Ok(()));
        store
            .expect_put()
            .with(eq(DEVICE_A), eq(ConfigField::Gain(73.0)))
            .times(1)
            .returning(|_, _| Ok(()));

        let (mut controller, _rx) =
            PipelineController::new(Arc::new(transport), Arc::new(store), test_config());
        controller.refresh_devices();
        controller.select_device(DEVICE_A).unwrap();

        controller.set_bandwidth(5_000_000).unwrap();
        controller.set_gain(120.0).unwrap();
        assert_eq!(controller.config().bandwidth, 5_000_000);
        assert_eq!(controller.config().gain, 73.0);
    }

    #[test]
    fn test_rejects_values_outside_catalog() {
        let (transport, _, _) = two_devices();
        let mut store = MockConfigRepository::new();
        store.expect_put().never();
        let (mut controller, _rx) =
            PipelineController::new(Arc::new(transport), Arc::new(store), test_config());

        assert!(matches!(
            controller.set_sample_rate(1_234_567),
            Err(AcqError::UnsupportedValue { .. })
        ));
        assert!(matches!(
            controller.set_bandwidth(700_000),
            Err(AcqError::UnsupportedValue { .. })
        ));
    }

    #[test]
    fn test_live_gain_change_reaches_hardware() {
        let (transport, a, _) = two_devices();
        let (mut controller, _rx) =
            PipelineController::new(Arc::new(transport), Arc::new(quiet_store()), test_config());
        controller.refresh_devices();
        controller.select_device(DEVICE_A).unwrap();
        controller.start().unwrap();

        controller.set_gain_mode(GainMode::SlowAttack).unwrap();
        controller.set_gain(30.0).unwrap();
        assert_eq!(
            a.channel_attr(SIM_PHY_DEVICE, "voltage0", false, "gain_control_mode")
                .as_deref(),
            Some("slow_attack")
        );
        assert_eq!(
            a.channel_attr(SIM_PHY_DEVICE, "voltage0", false, "hardwaregain")
                .as_deref(),
            Some("30")
        );

        controller.set_gain(-1.0).unwrap();
        assert_eq!(controller.config().gain, -1.0);
        assert_eq!(
            a.channel_attr(SIM_PHY_DEVICE, "voltage0", false, "hardwaregain")
                .as_deref(),
            Some("-1")
        );
        assert!(controller.is_streaming());
    }

    #[test]
    fn test_sample_rate_change_restarts_stream() {
        let (transport, a, _) = two_devices();
        let (mut controller, _rx) =
            PipelineController::new(Arc::new(transport), Arc::new(quiet_store()), test_config());
        controller.refresh_devices();
        controller.select_device(DEVICE_A).unwrap();
        controller.start().unwrap();

        controller.set_sample_rate(10_000_000).unwrap();
        assert!(controller.is_streaming());
        assert_eq!(
            a.channel_attr(SIM_PHY_DEVICE, "voltage0", false, "sampling_frequency")
                .as_deref(),
            Some("10000000")
        );
        assert_eq!(a.live_buffers(), 1);
    }

    #[test]
    fn test_reselect_stops_engine() {
        let (transport, a, _) = two_devices();
        let (mut controller, _rx) =
            PipelineController::new(Arc::new(transport), Arc::new(quiet_store()), test_config());
        controller.refresh_devices();
        controller.select_device(DEVICE_A).unwrap();
        controller.start().unwrap();

        controller.select_device(DEVICE_B).unwrap();
        assert_eq!(controller.state(), PipelineState::Idle);
        assert_eq!(a.live_buffers(), 0);
        assert_eq!(controller.config().uri, "usb:1.3.5");
    }

    #[test]
    fn test_render_reports_fault() {
        let (transport, a, _) = two_devices();
        a.fail_refill_after(2);
        let (mut controller, _rx) =
            PipelineController::new(Arc::new(transport), Arc::new(quiet_store()), test_config());
        controller.refresh_devices();
        controller.select_device(DEVICE_A).unwrap();
        controller.start().unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        let mut report = controller.render();
        while report.state != PipelineState::Idle && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
            report = controller.render();
        }

        assert_eq!(report.state, PipelineState::Idle);
        assert!(report.last_error.as_deref().unwrap_or("").contains("Stream fault"));
        assert_eq!(report.buffer_text(), "Buffer : nominal");
        assert!(report.to_string().contains(DEVICE_A));
    }
}
