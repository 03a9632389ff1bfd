//! Reads relative to the start of the image.

use core::cell::RefCell;

use storage::ReadFlash;

use crate::{Error, Result};

/// A window onto flash starting at the image base.  This is the only way the
/// loader touches flash.  It holds on to a RefCell so several readers, and the
/// image built on them, can share one device.
pub struct ImageReader<'f, F> {
    flash: &'f RefCell<F>,
    base: usize,
}

impl<'f, F: ReadFlash> ImageReader<'f, F> {
    pub fn new(flash: &'f RefCell<F>, base: usize) -> ImageReader<'f, F> {
        ImageReader { flash, base }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    /// Read `buf.len()` bytes at `offset` into the image.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        // Overflow of the device will be checked by the flash itself.
        let pos = self.base.checked_add(offset).ok_or(Error::InvalidImage)?;
        self.flash.borrow_mut().read(pos, buf)?;
        Ok(())
    }
}
