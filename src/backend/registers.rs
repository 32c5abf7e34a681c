//! Register map and channel routing of AD9361-class front ends
//!
//! The addresses and bit layouts below are vendor-specific and are kept
//! bit-for-bit. Routing decisions that depend on the duplex mode and the
//! selected RF port are resolved once into a [`StreamRoute`] instead of being
//! branched on inside the acquisition loop.

use crate::types::{DuplexMode, RfPort};

/// Debug attribute reporting 2RX/2TX mode (1) or 1RX/1TX mode (0)
pub const DUAL_MODE_ATTR: &str = "adi,2rx-2tx-mode-enable";

/// Debug attribute choosing the RX input in 1RX/1TX mode (1-based)
pub const SINGLE_MODE_RX_NUM_ATTR: &str = "adi,1rx-1tx-mode-use-rx-num";

/// Phy register holding the RX port-select field in bits 6..=7
pub const PORT_SELECT_REGISTER: u32 = 0x0000_0003;

/// Streaming core status register
pub const STREAM_STATUS: u32 = 0x8000_0088;

/// Underflow bit in [`STREAM_STATUS`]; write back to clear
pub const STATUS_UNDERFLOW_BIT: u32 = 0x4;

/// Streaming core decimation register (read once for diagnostics)
pub const DECIMATION_REGISTER: u32 = 0xC120_0000;

/// Phy gain status register for the first RX pair; bit 0 = overdrive
pub const OVERGAIN_RX1: u32 = 0x0000_005E;

/// Phy gain status register for the second RX pair in 2RX/2TX mode
pub const OVERGAIN_RX2: u32 = 0x0000_005F;

/// Attribute-style name used when reporting register write failures
pub fn register_attr_name(address: u32) -> String {
    format!("reg 0x{:08X}", address)
}

/// New value of the port-select register for `port`
///
/// The field is two bits wide; `RfPort` has two members so `index + 1`
/// always fits.
pub fn port_select_value(current: u32, port: RfPort) -> u32 {
    (current & 0x3F) | ((port.index() + 1) << 6)
}

/// Phy input channel carrying the RX gain/bandwidth/sample-rate attributes
pub fn phy_rx_channel(duplex: DuplexMode, port: RfPort) -> &'static str {
    match (duplex, port) {
        (DuplexMode::Dual, RfPort::Rx2) => "voltage1",
        _ => "voltage0",
    }
}

/// Streaming channels and status register for one `(duplex, port)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRoute {
    pub duplex: DuplexMode,
    pub port: RfPort,
    /// I rail on the streaming device
    pub i_channel: &'static str,
    /// Q rail on the streaming device
    pub q_channel: &'static str,
    /// Phy register holding the overdrive bit for this pair
    pub overgain_register: u32,
}

impl StreamRoute {
    pub fn resolve(duplex: DuplexMode, port: RfPort) -> Self {
        match (duplex, port) {
            (DuplexMode::Dual, RfPort::Rx2) => Self {
                duplex,
                port,
                i_channel: "voltage2",
                q_channel: "voltage3",
                overgain_register: OVERGAIN_RX2,
            },
            _ => Self {
                duplex,
                port,
                i_channel: "voltage0",
                q_channel: "voltage1",
                overgain_register: OVERGAIN_RX1,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_select_value_preserves_low_bits() {
        assert_eq!(port_select_value(0x00, RfPort::Rx1), 0x40);
        assert_eq!(port_select_value(0x00, RfPort::Rx2), 0x80);
        assert_eq!(port_select_value(0xFF, RfPort::Rx1), 0x7F);
        assert_eq!(port_select_value(0x15, RfPort::Rx2), 0x95);
    }

    #[test]
    fn test_route_dual_rx2_uses_second_pair() {
        let route = StreamRoute::resolve(DuplexMode::Dual, RfPort::Rx2);
        assert_eq!(route.i_channel, "voltage2");
        assert_eq!(route.q_channel, "voltage3");
        assert_eq!(route.overgain_register, OVERGAIN_RX2);
    }

    #[test]
    fn test_route_single_mode_always_first_pair() {
        for port in RfPort::ALL {
            let route = StreamRoute::resolve(DuplexMode::Single, port);
            assert_eq!(route.i_channel, "voltage0");
            assert_eq!(route.overgain_register, OVERGAIN_RX1);
            assert_eq!(phy_rx_channel(DuplexMode::Single, port), "voltage0");
        }
    }

    #[test]
    fn test_register_attr_name() {
        assert_eq!(register_attr_name(PORT_SELECT_REGISTER), "reg 0x00000003");
    }
}
