//! Physical memory window
//!
//! A window is the caller-reserved physical range the kernel, its boot
//! arguments and the device tree are placed into. It is addressed by physical
//! address and every access is checked against the window bounds, so a bad
//! segment address turns into [`BootError::OutOfWindow`] instead of a stray
//! write.

use core::marker::PhantomData;
use core::ptr;

use crate::error::{BootError, Result};

/// Bounds-checked view of a physical address range
pub struct PhysWindow<'a> {
    base: u64,
    ptr: *mut u8,
    len: usize,
    _memory: PhantomData<&'a mut [u8]>,
}

impl<'a> PhysWindow<'a> {
    /// Window over `memory`, which stands in for physical `base..`
    pub fn new(base: u64, memory: &'a mut [u8]) -> Self {
        Self {
            base,
            len: memory.len(),
            ptr: memory.as_mut_ptr(),
            _memory: PhantomData,
        }
    }

    /// Window over host memory at `ptr` that represents physical `base..`
    ///
    /// # Safety
    ///
    /// `ptr..ptr + len` must be valid for reads and writes for `'a` and not be
    /// accessed through any other path while the window is written.
    pub unsafe fn from_raw_parts(base: u64, ptr: *mut u8, len: usize) -> Self {
        Self {
            base,
            ptr,
            len,
            _memory: PhantomData,
        }
    }

    /// Window over identity-mapped physical memory
    ///
    /// # Safety
    ///
    /// Physical `base..base + len` must be RAM, identity mapped, and owned
    /// exclusively by the loader from now until the control transfer.
    pub unsafe fn from_raw(base: u64, len: usize) -> PhysWindow<'static> {
        // SAFETY: forwarded to the caller.
        unsafe { PhysWindow::from_raw_parts(base, base as usize as *mut u8, len) }
    }

    /// First physical address of the window
    pub fn base(&self) -> u64 {
        self.base
    }

    /// One past the last physical address of the window
    pub fn end(&self) -> u64 {
        self.base + self.len as u64
    }

    /// Window size in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the window is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if `addr..addr + len` lies inside the window
    pub fn contains(&self, addr: u64, len: u64) -> bool {
        self.offset(addr, len).is_ok()
    }

    fn offset(&self, addr: u64, len: u64) -> Result<usize> {
        let start = addr.checked_sub(self.base).ok_or(BootError::OutOfWindow)?;
        let end = start.checked_add(len).ok_or(BootError::OutOfWindow)?;
        if end > self.len as u64 {
            return Err(BootError::OutOfWindow);
        }
        Ok(start as usize)
    }

    /// Copy `src` to physical `addr`
    pub fn copy_from(&mut self, addr: u64, src: &[u8]) -> Result<()> {
        let offset = self.offset(addr, src.len() as u64)?;
        // SAFETY: `offset + src.len()` is inside the window. `ptr::copy`
        // tolerates overlap, although callers refuse overlapping sources.
        unsafe { ptr::copy(src.as_ptr(), self.ptr.add(offset), src.len()) };
        Ok(())
    }

    /// Zero `len` bytes at physical `addr`
    pub fn zero(&mut self, addr: u64, len: u64) -> Result<()> {
        let offset = self.offset(addr, len)?;
        // SAFETY: range checked above.
        unsafe { ptr::write_bytes(self.ptr.add(offset), 0, len as usize) };
        Ok(())
    }

    /// Bytes at physical `addr`
    pub fn bytes(&self, addr: u64, len: u64) -> Result<&[u8]> {
        let offset = self.offset(addr, len)?;
        // SAFETY: range checked above; the shared borrow of `self` keeps
        // writes out while the slice lives.
        Ok(unsafe { core::slice::from_raw_parts(self.ptr.add(offset), len as usize) })
    }

    /// Check if `other` shares host memory with physical `addr..addr + len`
    ///
    /// Ranges outside the window never overlap.
    pub fn overlaps(&self, addr: u64, len: u64, other: &[u8]) -> bool {
        let Ok(offset) = self.offset(addr, len) else {
            return false;
        };
        if len == 0 || other.is_empty() {
            return false;
        }

        let start = self.ptr as usize + offset;
        let end = start + len as usize;
        let other_start = other.as_ptr() as usize;
        let other_end = other_start + other.len();
        start < other_end && other_start < end
    }
}
