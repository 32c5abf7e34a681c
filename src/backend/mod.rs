//! Backend module for talking to AD9361-class front ends
//!
//! Everything that touches the hardware lives here, behind the
//! [`IioTransport`] family of traits so the rest of the crate never depends
//! on a concrete driver.
//!
//! # Components
//!
//! - [`IioTransport`] / [`IioContext`] / [`IioDevice`] / [`IioChannel`] /
//!   [`IioBuffer`] - Hardware interface traits
//! - [`DeviceRegistry`] - Scans transports and keeps the supported devices
//! - [`FrontEndSession`] - Owns one open link and applies tuning settings
//! - [`registers`] - Vendor register map and channel routing
//! - [`sim`] - In-memory front end for tests and `--simulate`
//! - `libiio` - FFI bindings to the system libiio (feature `libiio`)
//!
//! # Example
//!
//! ```ignore
//! use plutoacq_rs::backend::{DeviceRegistry, FrontEndSession};
//! use plutoacq_rs::config::AppConfig;
//!
//! let config = AppConfig::default();
//! let mut registry = DeviceRegistry::new(config.discovery.clone());
//! registry.refresh(transport.as_ref());
//!
//! let device = registry.resolve("PlutoSDR")?;
//! let mut session = FrontEndSession::new(transport, config.front_end, SessionConfig::default());
//! session.open(&device.uri)?;
//! session.configure_front_end()?;
//! ```

pub mod iio_trait;
#[cfg(feature = "libiio")]
pub mod libiio;
pub mod registers;
pub mod registry;
pub mod session;
pub mod sim;

pub use iio_trait::{ContextInfo, IioBuffer, IioChannel, IioContext, IioDevice, IioTransport};
#[cfg(feature = "libiio")]
pub use libiio::LibIioTransport;
pub use registers::StreamRoute;
pub use registry::{DeviceDescriptor, DeviceRegistry};
pub use session::{
    clamp_gain, read_duplex, requires_restart, FrontEndSession, LinkHandle, PortChange,
    SessionConfig, MAX_GAIN, MIN_GAIN,
};
pub use sim::{SimFrontEnd, SimPattern, SimTransport};

use std::sync::Arc;

/// Transport for real hardware, when compiled in
pub fn hardware_transport() -> Option<Arc<dyn IioTransport>> {
    #[cfg(feature = "libiio")]
    {
        Some(Arc::new(LibIioTransport::new()))
    }
    #[cfg(not(feature = "libiio"))]
    {
        None
    }
}
