//! # PlutoAcq-RS: IQ acquisition for AD9361-class SDR front ends
//!
//! Acquires a continuous stream of complex baseband samples from a
//! software-defined-radio front end over libiio and delivers them, converted
//! to interleaved `f32` I/Q, to a downstream consumer through a bounded
//! channel.
//!
//! ## Architecture
//!
//! - **Catalog**: Legal sample rates, bandwidths, gain modes, RF inputs and
//!   sample formats
//! - **Backend**: Hardware traits, device registry, front-end session, the
//!   libiio bindings and an in-memory simulator
//! - **Engine**: Worker thread that refills the hardware buffer, converts
//!   samples and monitors underflow and gain overdrive
//! - **Controller**: Lifecycle and configuration changes against the
//!   running engine
//! - **Communication**: Crossbeam channels between the worker and the consumer
//!
//! ## Configuration
//!
//! Application configuration and per-device settings are stored in the
//! platform-appropriate data directory under `dev.hxyulin.plutoacq-rs`:
//!
//! - **Linux**: `~/.local/share/dev.hxyulin.plutoacq-rs/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.plutoacq-rs/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.plutoacq-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use plutoacq_rs::{
//!     backend::{SimFrontEnd, SimTransport},
//!     config::{AppConfig, MemoryConfigStore},
//!     PipelineController,
//! };
//! use std::sync::Arc;
//!
//! let transport = SimTransport::new().with_device("PlutoSDR", "usb:1.2.5", SimFrontEnd::new());
//! let (mut controller, blocks) = PipelineController::new(
//!     Arc::new(transport),
//!     Arc::new(MemoryConfigStore::new()),
//!     AppConfig::default(),
//! );
//!
//! controller.refresh_devices();
//! controller.select_device("PlutoSDR")?;
//! controller.start()?;
//!
//! while let Some(block) = blocks.recv() {
//!     println!("{} samples", block.samples());
//! }
//! ```

pub mod backend;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use backend::{DeviceDescriptor, DeviceRegistry, FrontEndSession, IioTransport, SessionConfig};
pub use catalog::CapabilityCatalog;
pub use config::{AppConfig, ConfigField, ConfigRepository, JsonConfigStore, MemoryConfigStore};
pub use controller::{PipelineController, SourceControl, StatusReport};
pub use engine::{AcquisitionEngine, BlockReceiver, BufferPlan, EngineStats, IqBlock, StreamExit};
pub use error::{AcqError, Result};
pub use types::{EngineState, GainMode, HealthSnapshot, PipelineState, RfPort, SampleFormat};
