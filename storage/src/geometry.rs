//! Page and sector geometry.
//!
//! SPI NOR devices take a start address and stream bytes, but the address
//! counter only wraps within a page.  Every transfer is therefore split so no
//! piece crosses a page boundary.  Erases work on whole sectors.

/// The layout of a NOR device.  Both sizes are powers of two and a sector is a
/// whole number of pages.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Geometry {
    pub page_size: usize,
    pub sector_size: usize,
}

impl Geometry {
    pub const fn new(page_size: usize, sector_size: usize) -> Geometry {
        assert!(page_size.is_power_of_two());
        assert!(sector_size.is_power_of_two());
        assert!(sector_size >= page_size);
        Geometry { page_size, sector_size }
    }

    /// Bytes from `addr` up to the next page boundary.  A page-aligned address
    /// has a full page ahead of it.
    pub fn page_remaining(&self, addr: usize) -> usize {
        self.page_size - (addr & (self.page_size - 1))
    }

    /// Is this the first byte of a sector?
    pub fn is_sector_start(&self, addr: usize) -> bool {
        addr & (self.sector_size - 1) == 0
    }

    pub fn sector_index(&self, addr: usize) -> usize {
        addr / self.sector_size
    }

    /// Split `len` bytes starting at `addr` into page-bounded pieces.
    pub fn chunks(&self, addr: usize, len: usize) -> Chunks {
        Chunks {
            geometry: *self,
            addr,
            pos: 0,
            len,
        }
    }
}

/// One page-bounded piece of a larger transfer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Chunk {
    /// Device address of the first byte.
    pub addr: usize,
    /// Offset of the first byte within the caller's buffer.
    pub pos: usize,
    pub len: usize,
}

impl Chunk {
    /// The range of the caller's buffer this piece covers.
    pub fn span(&self) -> core::ops::Range<usize> {
        self.pos..self.pos + self.len
    }
}

/// Iterator over the pieces of a transfer, in increasing address order.
pub struct Chunks {
    geometry: Geometry,
    addr: usize,
    pos: usize,
    len: usize,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.pos >= self.len {
            return None;
        }
        let len = self.geometry.page_remaining(self.addr).min(self.len - self.pos);
        let chunk = Chunk {
            addr: self.addr,
            pos: self.pos,
            len,
        };
        self.addr += len;
        self.pos += len;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOR: Geometry = Geometry::new(256, 64 * 1024);

    fn lengths(addr: usize, len: usize) -> Vec<usize> {
        NOR.chunks(addr, len).map(|c| c.len).collect()
    }

    #[test]
    fn unaligned_start() {
        assert_eq!(lengths(0x8600f0, 300), [16, 256, 28]);
    }

    #[test]
    fn aligned_start() {
        assert_eq!(lengths(0x1000, 512), [256, 256]);
        assert_eq!(lengths(0x1000, 100), [100]);
        assert_eq!(lengths(0x10ff, 1), [1]);
        assert!(lengths(0x10ff, 0).is_empty());
    }

    #[test]
    fn covers_range_without_crossing_pages() {
        for &(addr, len) in &[(0usize, 1usize), (3, 1000), (0xff, 2), (0x1_fff0, 0x2345)] {
            let mut next = addr;
            let mut pos = 0;
            for chunk in NOR.chunks(addr, len) {
                assert_eq!(chunk.addr, next);
                assert_eq!(chunk.pos, pos);
                assert!(chunk.len > 0);
                assert!(chunk.len <= NOR.page_remaining(chunk.addr));
                next += chunk.len;
                pos += chunk.len;
            }
            assert_eq!(next, addr + len);
        }
    }

    #[test]
    fn sectors() {
        assert!(NOR.is_sector_start(0));
        assert!(NOR.is_sector_start(0x86_0000));
        assert!(!NOR.is_sector_start(0x86_0100));
        assert_eq!(NOR.sector_index(0x86_1234), 0x86);
        assert_eq!(NOR.page_remaining(0x100), 256);
        assert_eq!(NOR.page_remaining(0x1ff), 1);
    }
}
