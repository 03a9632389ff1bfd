//! Flash styles
//!
//! The serial NOR parts that end up on FPGA boards mostly share the 64 KiB
//! sector, 256 byte page layout the driver expects.  Where they differ is in
//! identity and in how long program and erase keep them busy.

use crate::SimSpiFlash;
use anyhow::Result;

/// The configuration of a single simulated device.
pub struct DeviceStyle {
    pub name: &'static str,
    pub jedec_id: u32,
    pub sectors: usize,
    /// Status polls that report busy after each program or erase.
    pub busy_polls: usize,
}

impl DeviceStyle {
    pub fn build(&self) -> Result<SimSpiFlash> {
        SimSpiFlash::new(self.jedec_id, self.sectors, self.busy_polls)
    }
}

/// Spansion 128 Mbit, the part on the reference board.
pub static S25FL128S: DeviceStyle = DeviceStyle {
    name: "S25FL128S",
    jedec_id: 0x01_20_18,
    sectors: 256,
    busy_polls: 3,
};

/// Micron.  Slow to finish.
pub static N25Q128A: DeviceStyle = DeviceStyle {
    name: "N25Q128A",
    jedec_id: 0x20_ba_18,
    sectors: 256,
    busy_polls: 7,
};

pub static MX25L12835F: DeviceStyle = DeviceStyle {
    name: "MX25L12835F",
    jedec_id: 0xc2_20_18,
    sectors: 256,
    busy_polls: 1,
};

/// Never reports busy.  This catches drivers that only work because of the
/// delay a busy poll adds.
pub static W25Q128JV: DeviceStyle = DeviceStyle {
    name: "W25Q128JV",
    jedec_id: 0xef_40_18,
    sectors: 256,
    busy_polls: 0,
};

/// All of the devices.
pub static ALL_DEVICES: [&DeviceStyle; 4] = [&S25FL128S, &N25Q128A, &MX25L12835F, &W25Q128JV];

/// An iterator that builds each of the devices in turn.
pub fn all_devices() -> impl Iterator<Item = Result<(&'static DeviceStyle, SimSpiFlash)>> {
    ALL_DEVICES
        .iter()
        .map(|style| style.build().map(|sim| (*style, sim)))
}
