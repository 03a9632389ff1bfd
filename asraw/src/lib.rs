//! AsRaw provides a safe way to view a structure as its bytes, and an unsafe
//! way to have this as a mutable view.  Generally, this is safe and meaningful
//! for structures that are repr(C).  `as_mut_raw` is only safe in this case.
//!
//! On-disk records (ELF headers, for instance) are read by handing the mutable
//! view to whatever does the reading; see [`fill`].

#![cfg_attr(not(any(feature = "std", test)), no_std)]

use core::{mem, slice};

pub trait AsRaw : Sized {
    fn as_raw(&self) -> &[u8] {
        unsafe {
            slice::from_raw_parts(self as *const _ as *const u8,
                                  mem::size_of::<Self>())
        }
    }
}

/// Provide a view into a structure.  This is an unsafe trait, because, in
/// general, it isn't safe to interpret arbitrary bytes as another type.
/// However, if the struct is `repr(C)`, and all types used are valid for all
/// possible values, this will be safe.
pub unsafe trait AsMutRaw : Sized {
    fn as_mut_raw(&mut self) -> &mut [u8] {
        unsafe {
            slice::from_raw_parts_mut(self as *mut _ as *mut u8,
                                      mem::size_of::<Self>())
        }
    }
}

/// Build a record by letting `read` fill in its bytes.  The record starts out
/// as its default, so a reader that fails part way leaves nothing observable:
/// the partial record is dropped with the error.
pub fn fill<T, E, F>(read: F) -> Result<T, E>
where
    T: AsMutRaw + Default,
    F: FnOnce(&mut [u8]) -> Result<(), E>,
{
    let mut item = T::default();
    read(item.as_mut_raw())?;
    Ok(item)
}
