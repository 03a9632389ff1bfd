#![no_main]
#![no_std]

#[cfg(not(any(feature = "semihosting", feature = "rtt")))]
extern crate panic_halt;
#[cfg(all(feature = "semihosting", not(feature = "rtt")))]
extern crate panic_semihosting;
#[cfg(feature = "rtt")]
use defmt_rtt as _;
#[cfg(feature = "rtt")]
use panic_probe as _;

use core::arch::asm;

use boot::config::MEM_TEST_WORDS;
use boot::{BootConfig, Handoff, PhysicalMemory, Sequencer};
use cortex_m::delay::Delay;
use cortex_m::peripheral::{SCB, SYST};
use cortex_m_rt::entry;
use embedded_hal::blocking::delay::DelayMs;

mod spi;
mod uart;

use spi::AxiQspi;
use uart::UartLite;

/// Debug output on the probe, separate from the console.
macro_rules! trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "rtt")]
        defmt::info!($($arg)*);
        #[cfg(all(feature = "semihosting", not(feature = "rtt")))]
        cortex_m_semihosting::hprintln!($($arg)*);
    }};
}

const UART_BASE: usize = 0x4060_0000;
const DDR_BASE: usize = 0x6000_0000;
const CORE_CLOCK_HZ: u32 = 50_000_000;

/// The AXI Quad SPI instance wired to the configuration flash.
const QSPI_FLASH_DEVICE_ID: u32 = 0;

#[entry]
fn main() -> ! {
    trace!("Start of loader");

    let Some(cp) = cortex_m::Peripherals::take() else {
        park()
    };

    let config = BootConfig {
        flash_device_id: QSPI_FLASH_DEVICE_ID,
        ..BootConfig::default()
    };
    let console = unsafe { UartLite::new(UART_BASE) };
    let ram = unsafe { core::slice::from_raw_parts_mut(DDR_BASE as *mut u32, MEM_TEST_WORDS) };
    let mut target = unsafe { PhysicalMemory::new() };
    let mut delay = boot_delay(cp.SYST);
    let mut handoff = CortexHandoff { scb: cp.SCB };

    Sequencer::new(config, console).run(
        AxiQspi::new(),
        ram,
        &mut target,
        &mut delay,
        &mut handoff,
    )
}

/// The boot delay runs off SysTick at the core clock.
fn boot_delay(syst: SYST) -> impl DelayMs<u32> {
    Delay::new(syst, CORE_CLOCK_HZ)
}

fn park() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

struct CortexHandoff {
    scb: SCB,
}

impl Handoff for CortexHandoff {
    fn halt(&mut self) -> ! {
        trace!("halted");
        park()
    }

    unsafe fn jump(&mut self, entry: usize) -> ! {
        trace!("chain 0x{:x}", entry as u32);
        self.scb.vtor.write(entry as u32);

        // The vector table may well be at address zero, which can't be read
        // through a Rust pointer.
        let (msp, reset): (u32, u32);
        asm!(
            "ldr {msp}, [{table}]",
            "ldr {reset}, [{table}, #4]",
            table = in(reg) entry,
            msp = out(reg) msp,
            reset = out(reg) reset,
            options(nostack, readonly, preserves_flags),
        );
        cortex_m::asm::bootstrap(msp as *const u32, reset as *const u32)
    }
}
