//! Core data types for the acquisition pipeline
//!
//! This module contains the fundamental enums shared by the catalog, the
//! front-end session, the acquisition engine and the controller.

use serde::{Deserialize, Serialize};

/// Automatic gain control mode of the RX front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GainMode {
    /// Gain is set explicitly through `hardwaregain`
    #[default]
    Manual,
    /// AGC with fast attack
    FastAttack,
    /// AGC with slow attack
    SlowAttack,
    /// Hybrid AGC
    Hybrid,
}

impl GainMode {
    /// All gain modes in display order
    pub const ALL: [GainMode; 4] = [
        GainMode::Manual,
        GainMode::FastAttack,
        GainMode::SlowAttack,
        GainMode::Hybrid,
    ];

    /// Value written to the `gain_control_mode` attribute (also the stored key)
    pub fn key(&self) -> &'static str {
        match self {
            GainMode::Manual => "manual",
            GainMode::FastAttack => "fast_attack",
            GainMode::SlowAttack => "slow_attack",
            GainMode::Hybrid => "hybrid",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            GainMode::Manual => "Manual",
            GainMode::FastAttack => "Fast Attack",
            GainMode::SlowAttack => "Slow Attack",
            GainMode::Hybrid => "Hybrid",
        }
    }

    /// Whether the hardware gain value is under user control
    pub fn is_manual(&self) -> bool {
        matches!(self, GainMode::Manual)
    }
}

impl std::fmt::Display for GainMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Selectable physical RF input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RfPort {
    /// First RX input
    #[default]
    Rx1,
    /// Second RX input
    Rx2,
}

impl RfPort {
    /// All ports in display order
    pub const ALL: [RfPort; 2] = [RfPort::Rx1, RfPort::Rx2];

    /// Zero-based port index
    pub fn index(&self) -> u32 {
        match self {
            RfPort::Rx1 => 0,
            RfPort::Rx2 => 1,
        }
    }

    /// Stored key
    pub fn key(&self) -> &'static str {
        match self {
            RfPort::Rx1 => "rx1",
            RfPort::Rx2 => "rx2",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            RfPort::Rx1 => "Rx1",
            RfPort::Rx2 => "Rx2",
        }
    }
}

impl std::fmt::Display for RfPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Sample word format delivered by the streaming device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Full I/Q: one 16-bit word per rail, two rails enabled
    #[default]
    Cs16,
    /// Reduced single-rail: the I rail carries packed 8-bit I and Q
    Cs8,
}

impl SampleFormat {
    /// All formats in display order
    pub const ALL: [SampleFormat; 2] = [SampleFormat::Cs16, SampleFormat::Cs8];

    /// Stored key
    pub fn key(&self) -> &'static str {
        match self {
            SampleFormat::Cs16 => "cs16",
            SampleFormat::Cs8 => "cs8",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            SampleFormat::Cs16 => "CS16",
            SampleFormat::Cs8 => "CS8",
        }
    }

    /// Bytes per complex sample in the hardware buffer
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::Cs16 => 4,
            SampleFormat::Cs8 => 2,
        }
    }

    /// Fixed divisor that normalizes raw words to roughly [-1, 1]
    pub fn scale(&self) -> f32 {
        match self {
            SampleFormat::Cs16 => 2048.0,
            SampleFormat::Cs8 => 128.0,
        }
    }

    /// Whether the Q rail is enabled on the streaming device
    pub fn uses_q_rail(&self) -> bool {
        matches!(self, SampleFormat::Cs16)
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Channel topology exposed by the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DuplexMode {
    /// 2RX/2TX: both RX channel pairs are exposed
    Dual,
    /// 1RX/1TX: one RX pair, port chosen through a register field
    Single,
}

impl DuplexMode {
    /// Interpret the `adi,2rx-2tx-mode-enable` debug attribute
    pub fn from_mode_flag(flag: i64) -> Self {
        if flag == 1 {
            DuplexMode::Dual
        } else {
            DuplexMode::Single
        }
    }
}

impl std::fmt::Display for DuplexMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplexMode::Dual => write!(f, "2RX/2TX"),
            DuplexMode::Single => write!(f, "1RX/1TX"),
        }
    }
}

/// Acquisition engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EngineState {
    #[default]
    Idle = 0,
    Starting = 1,
    Streaming = 2,
    Stopping = 3,
}

impl EngineState {
    /// Decode from the atomic representation
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Starting,
            2 => EngineState::Streaming,
            3 => EngineState::Stopping,
            _ => EngineState::Idle,
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Idle => write!(f, "Idle"),
            EngineState::Starting => write!(f, "Starting..."),
            EngineState::Streaming => write!(f, "Streaming"),
            EngineState::Stopping => write!(f, "Stopping..."),
        }
    }
}

/// Controller lifecycle as seen by the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// Nothing is running
    #[default]
    Idle,
    /// Link is being opened and configured
    Configuring,
    /// Engine is running
    Streaming,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "Idle"),
            PipelineState::Configuring => write!(f, "Configuring..."),
            PipelineState::Streaming => write!(f, "Streaming"),
        }
    }
}

/// Point-in-time copy of the health flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthSnapshot {
    /// Hardware ring buffer underflowed during the last cycle
    pub underflow: bool,
    /// Front end reported gain overdrive during the last cycle
    pub overgain: bool,
}

impl HealthSnapshot {
    /// Buffer status line
    pub fn buffer_text(&self) -> &'static str {
        if self.underflow {
            "Buffer : underflow"
        } else {
            "Buffer : nominal"
        }
    }

    /// Gain status line
    pub fn gain_text(&self) -> &'static str {
        if self.overgain {
            "Gain : overdrive"
        } else {
            "Gain : OK"
        }
    }
}

/// Format a frequency-like value the way the option lists label it
pub fn format_hz(value: f64) -> String {
    if value >= 1_000_000.0 {
        format!("{:.1}MHz", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("{:.1}KHz", value / 1_000.0)
    } else {
        format!("{:.1}Hz", value)
    }
}
