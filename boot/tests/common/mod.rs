// Shared test fixtures.
#![allow(dead_code)]

use boot::{config::IMAGE_BASE, Error, LoadTarget, Result};
use simflash::{styles, Op, SimSpiFlash};

/// RAM made of a few separate regions.  Every load is recorded.
pub struct TestMemory {
    regions: Vec<(u32, Vec<u8>)>,
    pub loads: Vec<(u32, usize)>,
}

impl TestMemory {
    pub fn new(regions: &[(u32, usize)]) -> TestMemory {
        TestMemory {
            regions: regions
                .iter()
                .map(|&(base, len)| (base, vec![0u8; len]))
                .collect(),
            loads: Vec::new(),
        }
    }

    fn find(&mut self, addr: u32, len: usize) -> Option<&mut [u8]> {
        let addr = addr as usize;
        self.regions.iter_mut().find_map(|(base, mem)| {
            let base = *base as usize;
            if addr >= base && addr + len <= base + mem.len() {
                Some(&mut mem[addr - base..addr - base + len])
            } else {
                None
            }
        })
    }

    pub fn bytes(&mut self, addr: u32, len: usize) -> Vec<u8> {
        match self.find(addr, len) {
            Some(mem) => mem.to_vec(),
            None => panic!("0x{:x}+0x{:x} is not mapped", addr, len),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.regions.iter().all(|(_, mem)| mem.iter().all(|b| *b == 0))
    }
}

impl LoadTarget for TestMemory {
    fn load<F>(&mut self, addr: u32, len: usize, mut fill: F) -> Result<()>
    where
        F: FnMut(usize, &mut [u8]) -> Result<()>,
    {
        self.loads.push((addr, len));
        match self.find(addr, len) {
            Some(dest) => fill(0, dest),
            None => Err(Error::UnmappedTarget { addr, len }),
        }
    }
}

/// The reference board's flash, with `image` at the image base.
pub fn flash_with(image: &[u8]) -> SimSpiFlash {
    let mut sim = styles::S25FL128S.build().unwrap();
    sim.install(image, IMAGE_BASE).unwrap();
    sim
}

/// The (address, length) of every read command.
pub fn reads(ops: &[Op]) -> Vec<(usize, usize)> {
    ops.iter()
        .filter_map(|op| match *op {
            Op::Read { addr, len } => Some((addr, len)),
            _ => None,
        })
        .collect()
}
