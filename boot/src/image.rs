//! Boot image support
//!
//! The image is a 32-bit little-endian ELF file.  Only the section header
//! table is consulted: the program headers, entry field and symbol tables are
//! all ignored.  Sections are visited in table order and every PROGBITS
//! section with a load address is copied there, byte for byte, straight out
//! of flash.  An 8 byte PROGBITS section at address zero is copied too; that
//! is where the image keeps its reset vector.
//!
//! Nothing about the load addresses is checked.  The image is trusted.

use core::mem::size_of;

use asraw::{AsMutRaw, AsRaw};
use storage::ReadFlash;

use crate::{Error, ImageReader, LoadTarget, Result};

/// "\x7fELF" read as a little-endian word.
pub const ELF_MAGIC: u32 = 0x464c_457f;

/// Section carrying initialized data.
pub const SHT_PROGBITS: u8 = 1;

/// Size of the one address zero section that gets loaded.
const ZERO_ADDR_SIZE: usize = 8;

/// How many loaded sections are remembered for the boot log.
pub const MAX_REPORTED: usize = 16;

/// An ELF image behind an image reader, with a valid header.
pub struct ElfImage<'r, 'f, F> {
    reader: &'r ImageReader<'f, F>,
    pub header: ElfHeader,
}

impl<'r, 'f, F: ReadFlash> ElfImage<'r, 'f, F> {
    /// Read the ELF header at the start of the image.  Anything without the
    /// ELF magic is rejected before the section table is looked at.
    pub fn from_reader(reader: &'r ImageReader<'f, F>) -> Result<ElfImage<'r, 'f, F>> {
        let header: ElfHeader = asraw::fill(|raw| reader.read(0, raw))?;

        if header.magic() != ELF_MAGIC {
            return Err(Error::InvalidImage);
        }

        Ok(ElfImage { reader, header })
    }

    pub fn section_count(&self) -> u8 {
        self.header.section_count()
    }

    /// Offset of the section header table within the image.
    pub fn section_table(&self) -> usize {
        self.header.section_table()
    }

    /// Iterate over the section headers, reading each one as it is reached.
    pub fn sections(&self) -> SectionIter<'r, 'f, F> {
        SectionIter {
            reader: self.reader,
            table: self.section_table(),
            index: 0,
            count: self.section_count(),
        }
    }

    /// Copy every loadable section to its address.  Sections are handled one
    /// at a time in table order; a failure stops the load, and whatever was
    /// already copied stays where it is.
    pub fn load<M: LoadTarget>(&self, target: &mut M) -> Result<EntryReady> {
        let mut ready = EntryReady::default();
        for entry in self.sections() {
            let (index, section) = entry?;
            if !section.is_loadable() {
                continue;
            }

            let offset = section.offset();
            target.load(section.addr(), section.size(), |pos, buf| {
                let at = offset.checked_add(pos).ok_or(Error::InvalidImage)?;
                self.reader.read(at, buf)
            })?;
            println!("section {}: 0x{:x} bytes at 0x{:08x}", index, section.size(), section.addr());
            ready.record(index, &section);
        }
        Ok(ready)
    }
}

/// Validate the image behind `reader` and load it into `target`.
pub fn load_image<F: ReadFlash, M: LoadTarget>(
    reader: &ImageReader<'_, F>,
    target: &mut M,
) -> Result<EntryReady> {
    ElfImage::from_reader(reader)?.load(target)
}

/// Helper like '?' for iterator operations, where errors should return
/// Some(Err(e)) instead of just the error.  This macro contains a return.
macro_rules! iter_try {
    ($e:expr) => {
        match $e {
            Ok(r) => r,
            Err(e) => return Some(Err(e.into())),
        }
    };
}

pub struct SectionIter<'r, 'f, F> {
    reader: &'r ImageReader<'f, F>,
    table: usize,
    index: u8,
    count: u8,
}

impl<'r, 'f, F: ReadFlash> Iterator for SectionIter<'r, 'f, F> {
    type Item = Result<(u8, SectionHeader)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let index = self.index;
        self.index += 1;

        let pos = iter_try!((index as usize)
            .checked_mul(size_of::<SectionHeader>())
            .and_then(|off| off.checked_add(self.table))
            .ok_or(Error::InvalidImage));
        let reader = self.reader;
        let header: SectionHeader = iter_try!(asraw::fill(|raw| reader.read(pos, raw)));
        Some(Ok((index, header)))
    }
}

/// A section that was copied.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LoadedSection {
    pub index: u8,
    pub addr: u32,
    pub size: usize,
}

/// Result of a successful load: the image is in memory and its entry point
/// can be jumped to.
#[derive(Debug, Default)]
pub struct EntryReady {
    /// Number of sections copied.
    pub count: usize,
    /// Bytes copied, over all sections.
    pub bytes: usize,
    /// The first MAX_REPORTED sections copied.
    pub sections: heapless::Vec<LoadedSection, MAX_REPORTED>,
}

impl EntryReady {
    fn record(&mut self, index: u8, section: &SectionHeader) {
        self.count += 1;
        self.bytes += section.size();
        // The list only feeds the boot log.  Past its capacity, sections are
        // still counted.
        let _ = self.sections.push(LoadedSection {
            index,
            addr: section.addr(),
            size: section.size(),
        });
    }
}

/// The ELF32 file header.  This is intended to be interpreted as a C struct;
/// all fields are little-endian.
#[derive(Debug, Default)]
#[repr(C)]
#[allow(dead_code)]
pub struct ElfHeader {
    ident: [u8; 16],
    kind: u16,
    machine: u16,
    version: u32,
    entry: u32,
    phoff: u32,
    shoff: u32,
    flags: u32,
    ehsize: u16,
    phentsize: u16,
    phnum: u16,
    shentsize: u16,
    shnum: u16,
    shstrndx: u16,
}

impl AsRaw for ElfHeader {}
unsafe impl AsMutRaw for ElfHeader {}

impl ElfHeader {
    /// The first four bytes of the file.
    pub fn magic(&self) -> u32 {
        u32::from_le_bytes([self.ident[0], self.ident[1], self.ident[2], self.ident[3]])
    }

    pub fn section_table(&self) -> usize {
        u32::from_le(self.shoff) as usize
    }

    /// Only the low byte of the section count is used.
    pub fn section_count(&self) -> u8 {
        u16::from_le(self.shnum) as u8
    }
}

/// An ELF32 section header.
#[derive(Debug, Default)]
#[repr(C)]
#[allow(dead_code)]
pub struct SectionHeader {
    name: u32,
    kind: u32,
    flags: u32,
    addr: u32,
    offset: u32,
    size: u32,
    link: u32,
    info: u32,
    addralign: u32,
    entsize: u32,
}

impl AsRaw for SectionHeader {}
unsafe impl AsMutRaw for SectionHeader {}

impl SectionHeader {
    /// Low byte of the section type.
    pub fn kind(&self) -> u8 {
        u32::from_le(self.kind) as u8
    }

    /// Load address, 0 for none.
    pub fn addr(&self) -> u32 {
        u32::from_le(self.addr)
    }

    /// Where the contents start, relative to the image.
    pub fn offset(&self) -> usize {
        u32::from_le(self.offset) as usize
    }

    pub fn size(&self) -> usize {
        u32::from_le(self.size) as usize
    }

    /// Does this section get copied into memory?
    pub fn is_loadable(&self) -> bool {
        self.kind() == SHT_PROGBITS && (self.addr() != 0 || self.size() == ZERO_ADDR_SIZE)
    }
}

const _: () = assert!(size_of::<ElfHeader>() == 52);
const _: () = assert!(size_of::<SectionHeader>() == 40);
