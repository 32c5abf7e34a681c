//! Simulated hardware helpers

use plutoacq_rs::backend::sim::{AttrWrite, SIM_PHY_DEVICE};
use plutoacq_rs::backend::{SimFrontEnd, SimPattern};

/// Front end producing a constant word so converted values are predictable
pub fn constant_front_end(word: i16) -> SimFrontEnd {
    SimFrontEnd::new().with_pattern(SimPattern::Constant(word))
}

/// Last value written to an RX attribute of the phy
pub fn phy_rx_attr(front_end: &SimFrontEnd, channel: &str, attr: &str) -> Option<String> {
    front_end.channel_attr(SIM_PHY_DEVICE, channel, false, attr)
}

/// Attribute names of the phy writes, in order
pub fn phy_write_order(front_end: &SimFrontEnd) -> Vec<String> {
    front_end
        .write_log()
        .into_iter()
        .filter(|w: &AttrWrite| w.device == SIM_PHY_DEVICE)
        .map(|w| w.attr)
        .collect()
}
