use crate::PageSize;
use core::fmt;
use core::ops::{Add, AddAssign};

/// Virtual memory address.
///
/// Sv39 translates the low 39 bits; each of the three levels consumes a 9-bit
/// virtual page number (VPN) field:
///
/// ```text
/// | 38‒30  | 29‒21  | 20‒12  | 11‒0   |
/// | VPN[2] | VPN[1] | VPN[0] | Offset |
/// ```
///
/// Address `0` is reserved as the "unmapped" sentinel and is never mapped.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0x8000_0000);
/// assert_eq!(va.vpn(2), 2);
/// assert_eq!(va.vpn(1), 0);
/// assert_eq!(va.vpn(0), 0);
/// assert_eq!(va.page_offset(1), 0);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr.addr() as u64)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Extract the 9-bit `VPN[level]` index field.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn vpn(self, level: u8) -> u16 {
        debug_assert!(level < 3, "Sv39 has three levels");
        ((self.0 >> (12 + 9 * level as u32)) & 0x1FF) as u16
    }

    /// The in-page offset for a leaf found at `level`: the low
    /// `12 + 9 * level` bits.
    #[inline]
    #[must_use]
    pub const fn page_offset(self, level: u8) -> u64 {
        self.0 & ((1u64 << (12 + 9 * level as u32)) - 1)
    }

    /// Offset within the page of size `S` that contains this address.
    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> u64 {
        self.0 & (S::SIZE - 1)
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA({:#014X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#014X}", self.0)
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}
