//! UART Lite console, transmit only.

use core::fmt;
use core::ptr;

const TX_FIFO: usize = 0x04;
const STAT: usize = 0x08;

const STAT_TX_FULL: u32 = 1 << 3;

pub struct UartLite {
    base: usize,
}

impl UartLite {
    /// # Safety
    ///
    /// `base` must be the register block of a UART Lite that nothing else
    /// writes to.
    pub const unsafe fn new(base: usize) -> UartLite {
        UartLite { base }
    }

    fn put(&mut self, byte: u8) {
        unsafe {
            while ptr::read_volatile((self.base + STAT) as *const u32) & STAT_TX_FULL != 0 {}
            ptr::write_volatile((self.base + TX_FIFO) as *mut u32, byte as u32);
        }
    }
}

impl fmt::Write for UartLite {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.put(byte);
        }
        Ok(())
    }
}
