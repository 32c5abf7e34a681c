//! Test data builders for creating test objects

use plutoacq_rs::backend::{SimFrontEnd, SimTransport};
use plutoacq_rs::config::{AppConfig, DeviceSettings, MemoryConfigStore};
use plutoacq_rs::PipelineController;
use std::sync::Arc;

/// Description of the first simulated device
pub const DEVICE_A: &str = "PlutoSDR (ad9361), serial=1044730a19970012";

/// Description of the second simulated device
pub const DEVICE_B: &str = "ANTSDR (ad9361), serial=2044730a19970013";

/// Endpoint of [`DEVICE_A`]
pub const URI_A: &str = "usb:1.2.5";

/// Endpoint of [`DEVICE_B`]
pub const URI_B: &str = "ip:192.168.2.1";

/// Builder for a controller wired to simulated front ends
pub struct ControllerBuilder {
    front_ends: Vec<(&'static str, &'static str, SimFrontEnd)>,
    store: MemoryConfigStore,
    config: AppConfig,
}

impl ControllerBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.stream.block_size = 512;
        config.stream.channel_depth = 8;
        Self {
            front_ends: Vec::new(),
            store: MemoryConfigStore::new(),
            config,
        }
    }

    pub fn device(mut self, description: &'static str, uri: &'static str, front_end: SimFrontEnd) -> Self {
        self.front_ends.push((description, uri, front_end));
        self
    }

    pub fn stored(mut self, description: &str, settings: DeviceSettings) -> Self {
        self.store = self.store.with_device(description, settings);
        self
    }

    pub fn channel_depth(mut self, depth: usize) -> Self {
        self.config.stream.channel_depth = depth;
        self
    }

    pub fn build(self) -> (PipelineController, plutoacq_rs::BlockReceiver) {
        let transport = self
            .front_ends
            .into_iter()
            .fold(SimTransport::new(), |t, (description, uri, fe)| {
                t.with_device(description, uri, fe)
            });
        let (mut controller, rx) =
            PipelineController::new(Arc::new(transport), Arc::new(self.store), self.config);
        controller.refresh_devices();
        (controller, rx)
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
