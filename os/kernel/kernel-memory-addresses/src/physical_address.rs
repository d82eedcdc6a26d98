use crate::{PageSize, PhysicalPage};
use core::fmt;
use core::ops::{Add, AddAssign};
use core::ptr::NonNull;

/// Physical memory address.
///
/// A thin wrapper around a raw `u64` denoting **physical** addresses (RAM or
/// MMIO). Like [`VirtualAddress`](super::VirtualAddress), this type carries
/// intent and prevents accidental VA↔PA mix-ups.
///
/// Address `0` is the reserved "unmapped / failure" sentinel; it is never a
/// legitimate mapping target. Use [`is_zero`](Self::is_zero) to test for it.
///
/// ### Sv39 physical page number
///
/// A physical address splits into a 44-bit physical page number and a 12-bit
/// page offset. Leaf entries store the page number in three sub-fields that
/// line up with the translation levels:
///
/// ```text
/// | 55‒30  | 29‒21  | 20‒12  | 11‒0   |
/// | PPN[2] | PPN[1] | PPN[0] | Offset |
/// |  26 b  |  9 b   |  9 b   |  12 b  |
/// ```
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x8020_1042);
/// assert_eq!(pa.ppn_field(0), 0x001);
/// assert_eq!(pa.ppn_field(1), 0x001);
/// assert_eq!(pa.ppn_field(2), 0x002);
/// assert_eq!(pa.offset::<Size4K>(), 0x042);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self::from_usize(ptr.addr())
    }

    #[inline]
    #[must_use]
    pub fn from_nonnull<T>(ptr: NonNull<T>) -> Self {
        Self::from_ptr(ptr.as_ptr())
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_usize(v: usize) -> Self {
        Self(v as u64)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// `true` for the reserved null sentinel.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned_to(self, align: u64) -> bool {
        debug_assert!(align.is_power_of_two());
        self.0 & (align - 1) == 0
    }

    /// The page of size `S` containing this address.
    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> PhysicalPage<S> {
        PhysicalPage::containing(self)
    }

    /// Offset of this address within its page of size `S`.
    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> u64 {
        self.0 & (S::SIZE - 1)
    }

    /// Full 44-bit physical page number (`address >> 12`).
    #[inline]
    #[must_use]
    pub const fn ppn(self) -> u64 {
        (self.0 >> 12) & ((1 << 44) - 1)
    }

    /// Extract the `PPN[level]` sub-field.
    ///
    /// Levels 0 and 1 are 9 bits wide, level 2 is 26 bits wide.
    #[inline]
    #[must_use]
    pub const fn ppn_field(self, level: u8) -> u64 {
        debug_assert!(level < 3, "Sv39 has three levels");
        let shift = 12 + 9 * level as u32;
        let mask = if level == 2 { 0x3FF_FFFF } else { 0x1FF };
        (self.0 >> shift) & mask
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA({:#014X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#014X}", self.0)
    }
}

impl fmt::LowerHex for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<PhysicalAddress> for u64 {
    #[inline]
    fn from(v: PhysicalAddress) -> Self {
        v.0
    }
}

impl<S: PageSize> From<PhysicalPage<S>> for PhysicalAddress {
    #[inline]
    fn from(value: PhysicalPage<S>) -> Self {
        value.base()
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}
