//! Boot sequencing
//!
//! The loader runs exactly once per reset:
//!
//! ```text
//! Start -> MemoryTesting -> ImageValidating -> SectionLoading -> ControlTransferred
//!               |                 |                  |
//!               +-----------------+------------------+--> Halted
//! ```
//!
//! A memory fault, an image without the ELF magic, or any flash failure prints
//! a diagnostic and halts.  Nothing is retried, and only a reset leaves the
//! halted state.  Control transfer does not come back either.

use core::cell::RefCell;
use core::fmt::Write;

use embedded_hal::blocking::delay::DelayMs;
use spiflash::{SpiFlash, Transport};

use crate::{
    memory_test, BootConfig, ElfImage, EntryReady, Error, ImageReader, LoadTarget, Result,
    TestRegion,
};

/// The two ways out of the loader.
pub trait Handoff {
    /// Park the processor for good.
    fn halt(&mut self) -> !;

    /// Transfer control to `entry`.
    ///
    /// # Safety
    ///
    /// `entry` must hold code the loaded image put there.  Everything the
    /// loader owned, including memory it was using, is given up.
    unsafe fn jump(&mut self, entry: usize) -> !;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BootState {
    Start,
    MemoryTesting,
    ImageValidating,
    SectionLoading,
    ControlTransferred,
    Halted(Error),
}

pub struct Sequencer<C> {
    config: BootConfig,
    console: C,
    state: BootState,
}

impl<C: Write> Sequencer<C> {
    pub fn new(config: BootConfig, console: C) -> Sequencer<C> {
        Sequencer {
            config,
            console,
            state: BootState::Start,
        }
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    /// Test RAM, bring up the flash and load the image.  On failure the
    /// diagnostic has been printed and the state is `Halted`.
    pub fn prepare<T, R, M>(&mut self, transport: T, ram: &mut R, target: &mut M) -> Result<EntryReady>
    where
        T: Transport,
        R: TestRegion + ?Sized,
        M: LoadTarget,
    {
        // Console errors have nowhere to be reported, here or below.
        let _ = write!(self.console, "\r\n{}\r\n\r\n", self.config.banner);

        let res = self.steps(transport, ram, target);
        if let Err(err) = &res {
            self.state = BootState::Halted(*err);
            self.diagnose(*err);
        }
        res
    }

    fn steps<T, R, M>(&mut self, transport: T, ram: &mut R, target: &mut M) -> Result<EntryReady>
    where
        T: Transport,
        R: TestRegion + ?Sized,
        M: LoadTarget,
    {
        self.state = BootState::MemoryTesting;
        memory_test(ram)?;

        self.state = BootState::ImageValidating;
        let flash = RefCell::new(SpiFlash::init(transport, self.config.flash_device_id)?);
        let reader = ImageReader::new(&flash, self.config.image_base);
        let image = ElfImage::from_reader(&reader)?;

        self.state = BootState::SectionLoading;
        image.load(target)
    }

    fn diagnose(&mut self, err: Error) {
        let _ = match err {
            Error::MemoryFault { index, found } => write!(
                self.console,
                "ERROR: Memory test failed!\r\n  word 0x{:x} read back 0x{:08x}\r\n",
                index, found
            ),
            Error::InvalidImage => write!(self.console, "ERROR: Boot image not found\r\n"),
            Error::Flash(e) => write!(self.console, "ERROR: Flash access failed: {:?}\r\n", e),
            Error::UnmappedTarget { addr, len } => write!(
                self.console,
                "ERROR: No memory for section at 0x{:08x} (0x{:x} bytes)\r\n",
                addr, len
            ),
        };
    }

    /// Boot.  Either halts, or jumps to the configured entry point after
    /// listing what was loaded and waiting the boot delay.  The state is
    /// `Halted` or `ControlTransferred` by the time the handoff is called.
    pub fn run<T, R, M, D, H>(
        &mut self,
        transport: T,
        ram: &mut R,
        target: &mut M,
        delay: &mut D,
        handoff: &mut H,
    ) -> !
    where
        T: Transport,
        R: TestRegion + ?Sized,
        M: LoadTarget,
        D: DelayMs<u32>,
        H: Handoff,
    {
        let ready = match self.prepare(transport, ram, target) {
            Ok(ready) => ready,
            Err(_) => handoff.halt(),
        };

        for sec in &ready.sections {
            let _ = write!(
                self.console,
                "  [{}] 0x{:08x} 0x{:x}\r\n",
                sec.index, sec.addr, sec.size
            );
        }
        let _ = write!(
            self.console,
            "{} sections, {} bytes\r\n\r\nBoot...\r\n",
            ready.count, ready.bytes
        );
        delay.delay_ms(self.config.boot_delay_ms);

        self.state = BootState::ControlTransferred;
        // The image was accepted and all of its sections are in place.
        unsafe { handoff.jump(self.config.entry_point) }
    }
}
