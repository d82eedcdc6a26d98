//! Bounds-checked byte arena over raw memory.
//!
//! Allocator metadata (page descriptors, heap block headers) and frame
//! zeroing all go through [`RawRegion`], so an address computed from corrupt
//! metadata halts instead of scribbling outside the managed memory.

use crate::fatal::fatal_assert;
use core::ptr::NonNull;
use kernel_info::boot::MemoryRange;
use kernel_memory_addresses::PhysicalAddress;

/// `len` bytes starting at `base`, accessed by offset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RawRegion {
    base: NonNull<u8>,
    len: usize,
}

// Safety: a RawRegion is an address range; exclusive use is arranged by its
// owner (allocators sit behind locks).
unsafe impl Send for RawRegion {}
unsafe impl Sync for RawRegion {}

impl RawRegion {
    /// # Safety
    /// `[base, base + len)` must be memory nobody else uses for as long as
    /// any copy of this region is alive, and must be valid for reads and
    /// writes.
    #[must_use]
    pub const unsafe fn from_raw_parts(base: NonNull<u8>, len: usize) -> Self {
        Self { base, len }
    }

    /// Region for a bring-up [`MemoryRange`] under an identity map;
    /// `None` for a null start.
    ///
    /// # Safety
    /// As [`from_raw_parts`](Self::from_raw_parts).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub unsafe fn from_range(range: MemoryRange) -> Option<Self> {
        let base = NonNull::new(range.start as usize as *mut u8)?;
        Some(unsafe { Self::from_raw_parts(base, range.len() as usize) })
    }

    #[inline]
    #[must_use]
    pub fn start(&self) -> PhysicalAddress {
        PhysicalAddress::from_nonnull(self.base)
    }

    /// One past the last byte.
    #[inline]
    #[must_use]
    pub fn end(&self) -> PhysicalAddress {
        self.start() + self.len as u64
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, addr: PhysicalAddress) -> bool {
        self.start() <= addr && addr < self.end()
    }

    /// Offset of `addr` from the start, if inside.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn offset_of(&self, addr: PhysicalAddress) -> Option<usize> {
        self.contains(addr)
            .then(|| (addr.as_u64() - self.start().as_u64()) as usize)
    }

    /// Address at `offset`; `offset == len` yields [`end`](Self::end).
    #[inline]
    #[must_use]
    pub fn addr_at(&self, offset: usize) -> PhysicalAddress {
        self.check(offset, 0);
        self.start() + offset as u64
    }

    /// Pointer to the byte at `offset`.
    #[inline]
    #[must_use]
    pub fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        self.check(offset, 1);
        // SAFETY: in bounds, checked above.
        unsafe { self.base.add(offset) }
    }

    /// `len` bytes at `offset`, sharing this region's memory.
    #[must_use]
    pub fn subregion(&self, offset: usize, len: usize) -> Self {
        self.check(offset, len);
        // SAFETY: in bounds; `offset < self.len` whenever `len > 0`.
        Self {
            base: unsafe { self.base.add(offset) },
            len,
        }
    }

    #[inline]
    fn check(&self, offset: usize, len: usize) {
        fatal_assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.len),
            "access of {len} bytes at offset {offset:#x} fits region {} of {:#x} bytes",
            self.start(),
            self.len
        );
    }

    #[inline]
    #[must_use]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.check(offset, 1);
        // SAFETY: in bounds.
        unsafe { self.base.add(offset).read() }
    }

    #[inline]
    pub fn write_u8(&self, offset: usize, value: u8) {
        self.check(offset, 1);
        // SAFETY: in bounds.
        unsafe { self.base.add(offset).write(value) }
    }

    #[inline]
    #[must_use]
    pub fn read_u64(&self, offset: usize) -> u64 {
        self.check(offset, 8);
        // SAFETY: in bounds; no alignment requirement.
        unsafe { self.base.add(offset).cast::<u64>().read_unaligned() }
    }

    #[inline]
    pub fn write_u64(&self, offset: usize, value: u64) {
        self.check(offset, 8);
        // SAFETY: in bounds; no alignment requirement.
        unsafe { self.base.add(offset).cast::<u64>().write_unaligned(value) }
    }

    /// Set `len` bytes at `offset` to `byte`.
    #[inline]
    pub fn fill(&self, offset: usize, len: usize, byte: u8) {
        self.check(offset, len);
        // SAFETY: in bounds.
        unsafe { self.base.add(offset).write_bytes(byte, len) }
    }
}
