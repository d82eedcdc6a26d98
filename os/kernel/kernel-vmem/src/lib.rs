//! # Virtual Memory Support
//!
//! Sv39 paging for a RISC-V kernel: page-table construction, software
//! translation and teardown.
//!
//! ## What you get
//! - An [`address space`](address_space) handle over a root table.
//! - Sv39 [`PteFlags`] shared with process creation.
//! - A 4 KiB-aligned [`PageTable`] node, the [`PageTableEntry`] bit layout and
//!   the decoded [`EntryKind`].
//! - A tiny allocator/mapper interface ([`FrameAlloc`], [`PhysMapper`]).
//!
//! ## Sv39 Virtual Address → Physical Address Walk
//!
//! Each 39-bit virtual address is divided into four fields:
//!
//! ```text
//! | 38‒30  | 29‒21  | 20‒12  | 11‒0   |
//! | VPN[2] | VPN[1] | VPN[0] | Offset |
//! ```
//!
//! The fields index three levels of tables, each holding 512 entries of
//! 8 bytes. A walk starts at the root (level 2) and stops at the first
//! **leaf** entry:
//!
//! ```text
//!  L2 (root) → L1 → L0 → 4 KiB frame
//!   │           │
//!   │           └──► leaf at L1 → 2 MiB frame
//!   └──────────────► leaf at L2 → 1 GiB frame
//! ```
//!
//! A leaf at level *i* yields `(leaf_pa & !mask) | (va & mask)` with
//! `mask = (1 << (12 + 9·i)) - 1`. An invalid entry anywhere is a miss.
//!
//! ## Ownership
//!
//! Every branch entry exclusively owns the table frame it points to. The root
//! frame belongs to whoever created the address space; [`AddressSpace::unmap`]
//! returns every frame below it to the allocator.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

pub mod address_space;
mod bits;
mod page_table;

pub use crate::address_space::{AddressSpace, MapError, Mapping};
pub use crate::bits::PteFlags;
pub use crate::page_table::{EntryKind, Level, PageTable, PageTableEntry, TableIndex};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Source of **physical** 4 KiB frames for page-table nodes.
///
/// Returned frames **must** be 4 KiB aligned and zero-filled.
pub trait FrameAlloc {
    /// Allocate one frame; `None` on out-of-memory.
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;

    /// Return a frame previously handed out by [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&mut self, page: PhysicalPage<Size4K>);
}

impl<A: FrameAlloc + ?Sized> FrameAlloc for &mut A {
    #[inline]
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        (**self).alloc_4k()
    }

    #[inline]
    fn free_4k(&mut self, page: PhysicalPage<Size4K>) {
        (**self).free_4k(page);
    }
}

/// Converts physical addresses to usable references in the current address
/// space. While the kernel initializes memory, paging is off and this is the
/// identity.
///
/// # Safety
/// - `pa` must be mapped writable for `&mut T`.
/// - Lifetime `'a` is purely borrow-checked; the mapping must remain valid
///   for `'a`.
/// - Type `T` must match the bytes at `pa` (no aliasing UB).
pub trait PhysMapper {
    /// # Safety
    /// See the trait documentation.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashSet;

    /// A 4 KiB-aligned host frame standing in for physical RAM.
    #[repr(C, align(4096))]
    pub struct Frame(pub [u8; 4096]);

    /// Hands out leaked host frames; their addresses are the "physical" ones.
    #[derive(Default)]
    pub struct HostFrames {
        pub live: HashSet<u64>,
        pub limit: Option<usize>,
        pub allocated: usize,
        pub freed: usize,
    }

    impl HostFrames {
        pub fn with_limit(limit: usize) -> Self {
            Self {
                limit: Some(limit),
                ..Self::default()
            }
        }

        pub fn root(&mut self) -> PhysicalAddress {
            self.alloc_4k().expect("root frame").base()
        }
    }

    impl FrameAlloc for HostFrames {
        fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
            if self.limit.is_some_and(|l| self.allocated >= l) {
                return None;
            }
            let frame = Box::leak(Box::new(Frame([0; 4096])));
            let pa = PhysicalAddress::from_ptr(frame);
            self.live.insert(pa.as_u64());
            self.allocated += 1;
            PhysicalPage::from_start(pa)
        }

        fn free_4k(&mut self, page: PhysicalPage<Size4K>) {
            assert!(self.live.remove(&page.base().as_u64()), "foreign frame {page}");
            self.freed += 1;
        }
    }

    /// Identity mapper: host addresses are used as physical addresses.
    pub struct Identity;

    impl PhysMapper for Identity {
        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            unsafe { &mut *(pa.as_u64() as *mut T) }
        }
    }
}
