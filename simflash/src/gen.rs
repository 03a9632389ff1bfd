//! Image generation.
//!
//! Builds small 32-bit little-endian ELF files of the shape a linker leaves
//! behind: a null section first, the requested sections, and a section name
//! table last.  Section contents come from a seeded PRNG so failures
//! reproduce.  There are no program headers, the loader never looks at them.

use byteorder::{LittleEndian, WriteBytesExt};
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

use anyhow::{bail, Result};

pub const ELF_MAGIC: u32 = 0x464c_457f;

pub const SHT_NULL: u32 = 0;
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_NOBITS: u32 = 8;

const SHF_WRITE: u32 = 0x1;
const SHF_ALLOC: u32 = 0x2;
const SHF_EXECINSTR: u32 = 0x4;

const EHDR_SIZE: usize = 52;
const SHDR_SIZE: usize = 40;

/// One entry of the generated section table.
#[derive(Debug, Clone)]
pub struct GeneratedSection {
    pub name: String,
    pub kind: u32,
    pub addr: u32,
    pub offset: u32,
    pub size: u32,
    /// File contents; empty for NOBITS.
    pub data: Vec<u8>,
}

pub struct GeneratedImage {
    pub data: Vec<u8>,
    /// In table order, the null section at index 0.
    pub sections: Vec<GeneratedSection>,
    /// File offset of the section header table.
    pub table: usize,
}

struct SectionPlan {
    kind: u32,
    addr: u32,
    size: usize,
    data: Option<Vec<u8>>,
}

pub struct ElfBuilder {
    /// First four bytes of the file, normally the ELF magic.
    magic: u32,
    /// Where section contents start.  Must leave room for the ELF header.
    data_start: usize,
    /// Seed for the PRNG
    seed: u64,
    sections: Vec<SectionPlan>,
}

impl Default for ElfBuilder {
    fn default() -> Self {
        ElfBuilder {
            magic: ELF_MAGIC,
            data_start: 0x100,
            seed: 1,
            sections: Vec::new(),
        }
    }
}

impl ElfBuilder {
    pub fn magic(&mut self, magic: u32) -> &mut Self {
        self.magic = magic;
        self
    }

    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = seed;
        self
    }

    pub fn data_start(&mut self, data_start: usize) -> &mut Self {
        self.data_start = data_start;
        self
    }

    /// Add a section of `size` bytes.  Contents are random, except that NOBITS
    /// sections have none in the file.
    pub fn section(&mut self, kind: u32, addr: u32, size: usize) -> &mut Self {
        self.sections.push(SectionPlan {
            kind,
            addr,
            size,
            data: None,
        });
        self
    }

    /// Add a section with the given contents.
    pub fn section_with(&mut self, kind: u32, addr: u32, data: &[u8]) -> &mut Self {
        self.sections.push(SectionPlan {
            kind,
            addr,
            size: data.len(),
            data: Some(data.to_vec()),
        });
        self
    }

    pub fn build(&self) -> Result<GeneratedImage> {
        // The loader only looks at the low byte of the count.
        if self.sections.len() + 2 > 255 {
            bail!("too many sections: {}", self.sections.len());
        }
        if self.data_start < EHDR_SIZE {
            bail!("data start 0x{:x} overlaps the ELF header", self.data_start);
        }

        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
        let mut file = vec![0u8; self.data_start];
        let mut names = vec![0u8];
        let mut sections = vec![GeneratedSection {
            name: String::new(),
            kind: SHT_NULL,
            addr: 0,
            offset: 0,
            size: 0,
            data: Vec::new(),
        }];

        for (i, plan) in self.sections.iter().enumerate() {
            align(&mut file, 4);
            let offset = file.len() as u32;
            let data = if plan.kind == SHT_NOBITS {
                Vec::new()
            } else if let Some(data) = &plan.data {
                data.clone()
            } else {
                let mut data = vec![0u8; plan.size];
                rng.fill_bytes(&mut data);
                data
            };
            file.extend_from_slice(&data);
            sections.push(GeneratedSection {
                name: format!(".sec{}", i + 1),
                kind: plan.kind,
                addr: plan.addr,
                offset,
                size: plan.size as u32,
                data,
            });
        }

        // Section names, the table's own name last.
        for sec in &sections[1..] {
            names.extend_from_slice(sec.name.as_bytes());
            names.push(0);
        }
        names.extend_from_slice(b".shstrtab\0");
        let strtab_offset = file.len() as u32;
        file.extend_from_slice(&names);
        sections.push(GeneratedSection {
            name: ".shstrtab".to_string(),
            kind: SHT_STRTAB,
            addr: 0,
            offset: strtab_offset,
            size: names.len() as u32,
            data: names.clone(),
        });

        align(&mut file, 4);
        let table = file.len();
        let mut name_pos = 1u32;
        for sec in &sections {
            let name = if sec.kind == SHT_NULL {
                0
            } else {
                let pos = name_pos;
                name_pos += sec.name.len() as u32 + 1;
                pos
            };
            let flags = match sec.kind {
                SHT_PROGBITS if sec.addr != 0 => SHF_ALLOC | SHF_EXECINSTR,
                SHT_NOBITS => SHF_ALLOC | SHF_WRITE,
                _ => 0,
            };
            file.write_u32::<LittleEndian>(name)?;
            file.write_u32::<LittleEndian>(sec.kind)?;
            file.write_u32::<LittleEndian>(flags)?;
            file.write_u32::<LittleEndian>(sec.addr)?;
            file.write_u32::<LittleEndian>(sec.offset)?;
            file.write_u32::<LittleEndian>(sec.size)?;
            file.write_u32::<LittleEndian>(0)?; // link
            file.write_u32::<LittleEndian>(0)?; // info
            file.write_u32::<LittleEndian>(if sec.kind == SHT_STRTAB { 1 } else { 4 })?;
            file.write_u32::<LittleEndian>(0)?; // entsize
        }

        let mut header = Vec::with_capacity(EHDR_SIZE);
        header.write_u32::<LittleEndian>(self.magic)?;
        // ELFCLASS32, ELFDATA2LSB, EV_CURRENT, then padding.
        header.extend_from_slice(&[1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        header.write_u16::<LittleEndian>(2)?; // ET_EXEC
        header.write_u16::<LittleEndian>(40)?; // EM_ARM
        header.write_u32::<LittleEndian>(1)?;
        header.write_u32::<LittleEndian>(0)?; // entry
        header.write_u32::<LittleEndian>(0)?; // phoff
        header.write_u32::<LittleEndian>(table as u32)?;
        header.write_u32::<LittleEndian>(0)?; // flags
        header.write_u16::<LittleEndian>(EHDR_SIZE as u16)?;
        header.write_u16::<LittleEndian>(0)?; // phentsize
        header.write_u16::<LittleEndian>(0)?; // phnum
        header.write_u16::<LittleEndian>(SHDR_SIZE as u16)?;
        header.write_u16::<LittleEndian>(sections.len() as u16)?;
        header.write_u16::<LittleEndian>(sections.len() as u16 - 1)?;
        file[..EHDR_SIZE].copy_from_slice(&header);

        Ok(GeneratedImage {
            data: file,
            sections,
            table,
        })
    }
}

fn align(file: &mut Vec<u8>, to: usize) {
    while file.len() % to != 0 {
        file.push(0);
    }
}

#[cfg(test)]
mod tester {
    use std::cell::RefCell;

    use boot::{ElfImage, ImageReader};
    use spiflash::SpiFlash;

    use crate::{styles, SIM_DEVICE_ID};

    use super::*;

    #[test]
    fn test_gen() {
        let img = ElfBuilder::default()
            .section(SHT_PROGBITS, 0x1000_0000, 0x123)
            .section(SHT_NOBITS, 0x1000_1000, 0x400)
            .section(SHT_PROGBITS, 0, 8)
            .build()
            .unwrap();
        assert_eq!(img.sections.len(), 5);
        assert_eq!(img.sections[1].offset, 0x100);
        assert_eq!(img.sections[1].data.len(), 0x123);
        assert!(img.sections[2].data.is_empty());
        assert_eq!(img.table % 4, 0);

        let mut sim = styles::S25FL128S.build().unwrap();
        sim.install(&img.data, 0x86_0000).unwrap();
        let flash = RefCell::new(SpiFlash::init(sim, SIM_DEVICE_ID).unwrap());
        let reader = ImageReader::new(&flash, 0x86_0000);
        let image = ElfImage::from_reader(&reader).unwrap();
        assert_eq!(image.section_count(), 5);
        assert_eq!(image.section_table(), img.table);

        for (entry, expect) in image.sections().zip(&img.sections) {
            let (_, header) = entry.unwrap();
            assert_eq!(header.kind(), expect.kind as u8);
            assert_eq!(header.addr(), expect.addr);
            assert_eq!(header.offset(), expect.offset as usize);
            assert_eq!(header.size(), expect.size as usize);
        }
    }

    #[test]
    fn same_seed_same_image() {
        let build = |seed| {
            ElfBuilder::default()
                .seed(seed)
                .section(SHT_PROGBITS, 0x1000_0000, 64)
                .build()
                .unwrap()
                .data
        };
        assert_eq!(build(3), build(3));
        assert_ne!(build(3), build(4));
    }

    #[test]
    fn bad_layouts() {
        assert!(ElfBuilder::default().data_start(16).build().is_err());
        let mut many = ElfBuilder::default();
        for _ in 0..254 {
            many.section(SHT_NOBITS, 0, 0);
        }
        assert!(many.build().is_err());
    }
}
