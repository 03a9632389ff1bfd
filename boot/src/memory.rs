//! RAM.
//!
//! Two things touch memory directly: the self-test, which writes a pattern and
//! reads it back, and the section loader, which copies flash straight to load
//! addresses.  Both go through traits here so the raw pointer handling stays
//! in this file.

use core::ptr;

use crate::{Error, Result};

/// A run of words the self-test may overwrite.
pub trait TestRegion {
    fn words(&self) -> usize;
    fn store_word(&mut self, index: usize, value: u32);
    fn load_word(&self, index: usize) -> u32;
}

/// Volatile, so the compiler can't answer the read-back from registers.
impl TestRegion for [u32] {
    fn words(&self) -> usize {
        self.len()
    }

    fn store_word(&mut self, index: usize, value: u32) {
        unsafe { ptr::write_volatile(&mut self[index], value) }
    }

    fn load_word(&self, index: usize) -> u32 {
        unsafe { ptr::read_volatile(&self[index]) }
    }
}

/// Fill the region with its own word indices, then check every word.  The
/// test is destructive.
pub fn memory_test<R: TestRegion + ?Sized>(ram: &mut R) -> Result<()> {
    let words = ram.words();
    for index in 0..words {
        ram.store_word(index, index as u32);
    }
    for index in 0..words {
        let found = ram.load_word(index);
        if found != index as u32 {
            return Err(Error::MemoryFault { index, found });
        }
    }
    Ok(())
}

/// Somewhere sections can be copied to.
pub trait LoadTarget {
    /// Place `len` bytes at `addr`.  The target calls `fill(pos, buf)` to get
    /// the bytes for offset `pos` of the range, where `buf` is, whenever
    /// possible, the destination memory itself.
    fn load<F>(&mut self, addr: u32, len: usize, fill: F) -> Result<()>
    where
        F: FnMut(usize, &mut [u8]) -> Result<()>;
}

/// Stage size for ranges that can't be handed out as a slice.
const STAGE: usize = 64;

/// The processor's physical address space.  No range is checked: the image
/// decides where its sections go.
pub struct PhysicalMemory {
    _private: (),
}

impl PhysicalMemory {
    /// # Safety
    ///
    /// Every range later passed to `load` must be RAM that nothing else,
    /// including the running loader, is using.
    pub unsafe fn new() -> PhysicalMemory {
        PhysicalMemory { _private: () }
    }
}

impl LoadTarget for PhysicalMemory {
    fn load<F>(&mut self, addr: u32, len: usize, mut fill: F) -> Result<()>
    where
        F: FnMut(usize, &mut [u8]) -> Result<()>,
    {
        let base = addr as usize;
        if base != 0 {
            let dest = unsafe { core::slice::from_raw_parts_mut(base as *mut u8, len) };
            return fill(0, dest);
        }

        // No reference may point at address zero, so this range is copied
        // through a buffer with volatile stores instead.
        let mut stage = [0u8; STAGE];
        let mut pos = 0;
        while pos < len {
            let count = (len - pos).min(STAGE);
            fill(pos, &mut stage[..count])?;
            for (i, byte) in stage[..count].iter().enumerate() {
                unsafe { ptr::write_volatile((pos + i) as *mut u8, *byte) }
            }
            pos += count;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One data line stuck high.
    struct StuckBit(Vec<u32>);

    impl TestRegion for StuckBit {
        fn words(&self) -> usize {
            self.0.len()
        }
        fn store_word(&mut self, index: usize, value: u32) {
            self.0[index] = if index == 0x20 { value | 0x10 } else { value };
        }
        fn load_word(&self, index: usize) -> u32 {
            self.0[index]
        }
    }

    /// Address line 8 disconnected: the upper half aliases the lower.
    struct Aliased(Vec<u32>);

    impl TestRegion for Aliased {
        fn words(&self) -> usize {
            self.0.len() * 2
        }
        fn store_word(&mut self, index: usize, value: u32) {
            let len = self.0.len();
            self.0[index % len] = value;
        }
        fn load_word(&self, index: usize) -> u32 {
            self.0[index % self.0.len()]
        }
    }

    #[test]
    fn good_ram() {
        let mut ram = vec![0xdead_beef_u32; 0x1000];
        memory_test(ram.as_mut_slice()).unwrap();
        assert_eq!(ram[0x123], 0x123);
        assert_eq!(ram[0xfff], 0xfff);
    }

    #[test]
    fn stuck_bit() {
        let mut ram = StuckBit(vec![0; 0x100]);
        assert_eq!(
            memory_test(&mut ram),
            Err(Error::MemoryFault {
                index: 0x20,
                found: 0x30
            })
        );
    }

    #[test]
    fn aliased_address() {
        let mut ram = Aliased(vec![0; 0x100]);
        assert_eq!(
            memory_test(&mut ram),
            Err(Error::MemoryFault {
                index: 0,
                found: 0x100
            })
        );
    }

    #[test]
    fn empty_range() {
        let mut mem = unsafe { PhysicalMemory::new() };
        let mut calls = 0;
        mem.load(0x1000, 0, |_, buf| {
            calls += 1;
            assert!(buf.is_empty());
            Ok(())
        })
        .unwrap();
        assert_eq!(calls, 1);
        mem.load(0, 0, |_, _| panic!("nothing to fill")).unwrap();
    }
}
