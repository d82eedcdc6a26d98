//! # Sv39 Physical and Virtual Address Types
//!
//! Strongly typed wrappers for raw memory addresses and page bases used by the
//! frame allocator, the heap and the page-table code.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A physical (RAM/MMIO) byte address. |
//! | [`VirtualAddress`] | A virtual address, translated through the page tables. |
//! | [`PhysicalPage<S>`] | The aligned base of a physical page of size `S`. |
//!
//! ## Page Sizes
//!
//! Sv39 leaves can sit at any of the three levels, which gives three page
//! sizes, each represented by a marker type implementing [`PageSize`]:
//!
//! - [`Size4K`]: 4 KiB base pages (level-0 leaf)
//! - [`Size2M`]: 2 MiB megapages (level-1 leaf)
//! - [`Size1G`]: 1 GiB gigapages (level-2 leaf)
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0000_0040_2030_1234);
//! assert_eq!(va.vpn(2), 0x100);
//! assert_eq!(va.vpn(1), 0x101);
//! assert_eq!(va.vpn(0), 0x101);
//! assert_eq!(va.offset::<Size4K>(), 0x234);
//!
//! let pa = PhysicalAddress::new(0x8000_1000);
//! let page = PhysicalPage::<Size4K>::from_start(pa).unwrap();
//! assert_eq!(PhysicalPage::<Size4K>::from_number(page.number()), page);
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` over `u64` and implement `Copy`,
//!   `Eq`, `Ord` and `Hash`.
//! - All alignment and field-extraction helpers are `const fn`.
//! - Address `0` is the reserved null sentinel for both kinds of address.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;

pub use page_size::{PageSize, Size1G, Size2M, Size4K};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;

/// Align `x` up to the nearest multiple of `a`.
///
/// `a` must be a non-zero power of two and `x + a - 1` must not overflow.
///
/// ```rust
/// # use kernel_memory_addresses::align_up;
/// assert_eq!(align_up(0, 8), 0);
/// assert_eq!(align_up(40, 8), 40);
/// assert_eq!(align_up(41, 8), 48);
/// assert_eq!(align_up(4097, 4096), 8192);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_up(x: usize, a: usize) -> usize {
    (x + a - 1) & !(a - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vpn_fields_cover_39_bits() {
        let va = VirtualAddress::new(0x7F_FFFF_FFFF);
        assert_eq!(va.vpn(0), 0x1FF);
        assert_eq!(va.vpn(1), 0x1FF);
        assert_eq!(va.vpn(2), 0x1FF);
        assert_eq!(va.page_offset(0), 0xFFF);
        assert_eq!(va.page_offset(1), 0x1F_FFFF);
        assert_eq!(va.page_offset(2), 0x3FFF_FFFF);
    }

    #[test]
    fn ppn_fields_split_9_9_26() {
        let pa = PhysicalAddress::new(0x00FF_FFFF_FFFF_F000);
        assert_eq!(pa.ppn_field(0), 0x1FF);
        assert_eq!(pa.ppn_field(1), 0x1FF);
        assert_eq!(pa.ppn_field(2), 0x3FF_FFFF);
        assert_eq!(pa.ppn(), (1 << 44) - 1);
    }

    #[test]
    fn page_alignment() {
        let pa = PhysicalAddress::new(0x8000_0123);
        assert!(PhysicalPage::<Size4K>::from_start(pa).is_none());
        assert_eq!(pa.page::<Size4K>().base().as_u64(), 0x8000_0000);
        assert_eq!(pa.page::<Size4K>().number(), 0x80000);
        assert!(pa.page::<Size4K>().base().is_aligned_to(4096));
    }

    #[test]
    fn zero_is_the_sentinel() {
        assert!(PhysicalAddress::zero().is_zero());
        assert!(VirtualAddress::zero().is_zero());
        assert!(!PhysicalAddress::new(1).is_zero());
    }
}
