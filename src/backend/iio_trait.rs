//! Hardware interface traits
//!
//! This module provides a common set of traits for talking to an IIO-style
//! front end, enabling both the real libiio bindings and the simulated front
//! end used for testing. The shape follows the IIO object model: a scan
//! transport yields contexts, a context owns devices, a device owns channels
//! and buffers.
//!
//! Every call may fail. Nothing here assumes atomicity across multiple
//! attribute writes.

use crate::error::Result;
use std::sync::Arc;

/// One entry returned by a transport scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    /// Free-form description (model, serial, ...)
    pub description: String,
    /// Connection endpoint, e.g. `usb:1.2.5` or `ip:192.168.2.1`
    pub uri: String,
}

impl ContextInfo {
    pub fn new(description: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            uri: uri.into(),
        }
    }
}

/// Discovers and opens contexts
///
/// Implementations must be `Send + Sync` so a single transport can be shared
/// between the controller and helper threads.
#[cfg_attr(test, mockall::automock)]
pub trait IioTransport: Send + Sync {
    /// Scan the given transport schemes (e.g. `"usb:ip"`)
    ///
    /// No ordering or deduplication is guaranteed.
    fn scan(&self, schemes: &str) -> Result<Vec<ContextInfo>>;

    /// Open a context for the given endpoint
    fn open(&self, uri: &str) -> Result<Box<dyn IioContext>>;
}

/// An open connection to one front end
pub trait IioContext: Send + Sync {
    /// Look up a device by its logical name
    fn find_device(&self, name: &str) -> Option<Arc<dyn IioDevice>>;
}

/// A device inside a context (physical layer or streaming core)
pub trait IioDevice: Send + Sync {
    /// Logical device name
    fn name(&self) -> &str;

    /// Look up a channel by id and direction
    fn find_channel(&self, id: &str, output: bool) -> Option<Arc<dyn IioChannel>>;

    /// Read a numeric debug attribute
    fn debug_attr_read_i64(&self, attr: &str) -> Result<i64>;

    /// Write a numeric debug attribute
    fn debug_attr_write_i64(&self, attr: &str, value: i64) -> Result<()>;

    /// Read a numbered register
    fn reg_read(&self, address: u32) -> Result<u32>;

    /// Write a numbered register
    fn reg_write(&self, address: u32, value: u32) -> Result<()>;

    /// Number of kernel-side DMA buffers used for pipelined refill
    fn set_kernel_buffers_count(&self, count: usize) -> Result<()>;

    /// Create a capture buffer holding `samples` samples per enabled channel
    fn create_buffer(&self, samples: usize) -> Result<Box<dyn IioBuffer>>;
}

/// One channel of a device
pub trait IioChannel: Send + Sync {
    /// Channel id, e.g. `voltage0` or `altvoltage1`
    fn id(&self) -> &str;

    fn attr_write_str(&self, attr: &str, value: &str) -> Result<()>;

    fn attr_write_i64(&self, attr: &str, value: i64) -> Result<()>;

    fn attr_write_f64(&self, attr: &str, value: f64) -> Result<()>;

    fn attr_write_bool(&self, attr: &str, value: bool) -> Result<()>;

    /// Include this channel in subsequently created buffers
    fn enable(&self);

    /// Exclude this channel from buffers
    fn disable(&self);

    fn is_enabled(&self) -> bool;
}

/// A capture buffer owned by the acquisition worker
///
/// The buffer is destroyed when dropped.
pub trait IioBuffer: Send {
    /// Block until the next block of samples is available
    ///
    /// Returns the number of bytes now available.
    fn refill(&mut self) -> Result<usize>;

    /// Raw little-endian sample words of the last refill
    fn as_bytes(&self) -> &[u8];
}
