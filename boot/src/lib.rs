//! This is a second stage loader built for embedded rust.
//!
//! It checks RAM, finds an ELF image in SPI NOR flash, copies the sections that
//! belong in memory to their load addresses, and jumps to the loaded code.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

/// To make development a little easier, allow println in the 'std' code, and
/// just make it vanish when we are no_std.
#[cfg(not(feature = "std"))]
macro_rules! println {
    ($($_e:expr),+) => { {} };
}

pub mod config;
mod image;
mod memory;
mod reader;
mod sequencer;

pub use config::BootConfig;
pub use image::{
    load_image, ElfHeader, ElfImage, EntryReady, LoadedSection, SectionHeader, SectionIter,
    ELF_MAGIC, MAX_REPORTED, SHT_PROGBITS,
};
pub use memory::{memory_test, LoadTarget, PhysicalMemory, TestRegion};
pub use reader::ImageReader;
pub use sequencer::{BootState, Handoff, Sequencer};

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    Flash(storage::Error),
    /// Bad magic, or offsets that run off the end of the address space.
    InvalidImage,
    /// RAM did not read back what was written.  `index` is the word.
    MemoryFault { index: usize, found: u32 },
    /// The load target has no memory behind this range.
    UnmappedTarget { addr: u32, len: usize },
}

/// Convert the flash error into our error type.
impl From<storage::Error> for Error {
    fn from(e: storage::Error) -> Self {
        Error::Flash(e)
    }
}
