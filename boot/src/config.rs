//! Board configuration.
//!
//! The defaults describe the reference board; a board crate overrides what
//! differs with struct update syntax.

/// Where the image starts in flash.
pub const IMAGE_BASE: usize = 0x0086_0000;

/// Words of RAM covered by the self-test.
pub const MEM_TEST_WORDS: usize = 0x1000;

/// The loaded image places its entry here.
pub const ENTRY_POINT: usize = 0;

/// Pause between the last console line and the jump, so it can be read.
pub const BOOT_DELAY_MS: u32 = 500;

pub const BANNER: &str = concat!("ELF bootloader ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct BootConfig {
    /// Selects the SPI controller configuration of the flash.
    pub flash_device_id: u32,
    pub image_base: usize,
    pub entry_point: usize,
    pub boot_delay_ms: u32,
    pub banner: &'static str,
}

impl Default for BootConfig {
    fn default() -> Self {
        BootConfig {
            flash_device_id: 0,
            image_base: IMAGE_BASE,
            entry_point: ENTRY_POINT,
            boot_delay_ms: BOOT_DELAY_MS,
            banner: BANNER,
        }
    }
}
