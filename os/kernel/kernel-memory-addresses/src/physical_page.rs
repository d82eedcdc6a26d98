use crate::{PageSize, PhysicalAddress, Size4K};
use core::fmt;
use core::marker::PhantomData;

/// Physical memory page base for size `S`.
///
/// A `PhysicalPage<S>` represents the **page-aligned base** of a physical page
/// of size `S` (`S::SIZE` bytes). Page-table nodes and allocator frames are
/// always `PhysicalPage<Size4K>`.
///
/// ### Invariants
/// - The low `S::SHIFT` bits of the base are always zero.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x8123_4567);
/// let pp = pa.page::<Size2M>();
/// assert_eq!(pp.base().as_u64(), 0x8120_0000);
/// assert_eq!(pp.base().as_u64() | pa.offset::<Size2M>(), pa.as_u64());
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize> {
    base: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> PhysicalPage<S> {
    /// The page containing `pa` (aligns down).
    #[inline]
    #[must_use]
    pub const fn containing(pa: PhysicalAddress) -> Self {
        Self {
            base: pa.as_u64() & !(S::SIZE - 1),
            _size: PhantomData,
        }
    }

    /// The page starting exactly at `pa`, or `None` if `pa` is not aligned.
    #[inline]
    #[must_use]
    pub const fn from_start(pa: PhysicalAddress) -> Option<Self> {
        if pa.as_u64() & (S::SIZE - 1) == 0 {
            Some(Self::containing(pa))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.base)
    }

    /// Physical page number of the base in 4 KiB units.
    #[inline]
    #[must_use]
    pub const fn number(self) -> u64 {
        self.base >> Size4K::SHIFT
    }
}

impl PhysicalPage<Size4K> {
    /// Rebuild a 4 KiB page from its physical page number.
    #[inline]
    #[must_use]
    pub const fn from_number(ppn: u64) -> Self {
        Self {
            base: ppn << Size4K::SHIFT,
            _size: PhantomData,
        }
    }
}

impl<S: PageSize> fmt::Display for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#014X}/{}", self.base, S::as_str())
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage<{}>({:#014X})", S::as_str(), self.base)
    }
}
