//! Error handling for the acquisition pipeline
//!
//! This module defines the crate-wide error type and a Result alias. Every
//! hardware-facing failure is local to the handle it happened on and is never
//! retried automatically; callers decide whether to re-invoke `start`.

use thiserror::Error;

/// Main error type for acquisition operations
#[derive(Error, Debug)]
pub enum AcqError {
    /// Transport scan failed (non-fatal, the registry is left empty)
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// The registry holds no devices at all
    #[error("No devices available")]
    NotFound,

    /// No device is currently selected
    #[error("No device selected")]
    NoDevice,

    /// The selected device vanished
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Connection to the endpoint could not be established
    #[error("Link unavailable: {uri}")]
    LinkUnavailable { uri: String },

    /// A required sub-device is missing from the opened context
    #[error("Device missing: {name}")]
    DeviceMissing { name: String },

    /// An operation needed an open link but the session is closed
    #[error("Link is not open")]
    NotOpen,

    /// A hardware attribute or register write failed during configuration
    #[error("Failed to write attribute '{attribute}': {reason}")]
    AttributeWrite { attribute: String, reason: String },

    /// A hardware attribute or register read failed
    #[error("Failed to read attribute '{attribute}': {reason}")]
    AttributeRead { attribute: String, reason: String },

    /// RX channel handles could not be found when starting the stream
    #[error("Channel acquisition error: {0}")]
    ChannelAcquisition(String),

    /// Ring buffer or kernel buffer allocation failed
    #[error("Buffer allocation error: {0}")]
    BufferAllocation(String),

    /// Buffer refill failed while streaming
    #[error("Stream fault: {0}")]
    StreamFault(String),

    /// Raw failure reported by a hardware backend
    #[error("Hardware error in {operation}: code {code}")]
    Hardware { operation: String, code: i32 },

    /// A value outside the capability catalog was requested
    #[error("Unsupported {field}: {value}")]
    UnsupportedValue { field: &'static str, value: String },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<AcqError>,
    },
}

impl AcqError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        AcqError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Build an attribute write error from any lower-level failure
    pub fn attribute_write(attribute: impl Into<String>, reason: impl ToString) -> Self {
        AcqError::AttributeWrite {
            attribute: attribute.into(),
            reason: reason.to_string(),
        }
    }

    /// Build an attribute read error from any lower-level failure
    pub fn attribute_read(attribute: impl Into<String>, reason: impl ToString) -> Self {
        AcqError::AttributeRead {
            attribute: attribute.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error came from opening the link
    pub fn is_open_error(&self) -> bool {
        match self {
            AcqError::LinkUnavailable { .. } | AcqError::DeviceMissing { .. } => true,
            AcqError::WithContext { source, .. } => source.is_open_error(),
            _ => false,
        }
    }
}

/// Result type alias for acquisition operations
pub type Result<T> = std::result::Result<T, AcqError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
