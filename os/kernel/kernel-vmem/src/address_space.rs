//! # Address Space (Sv39, 3-level)
//!
//! Handle over one page-table tree rooted at an externally owned frame.
//!
//! ## Highlights
//!
//! - [`AddressSpace::map`] installs one leaf at a chosen level, allocating
//!   missing intermediate tables on the way down.
//! - [`AddressSpace::map_pages`] / [`AddressSpace::map_identity_range`] map
//!   runs of 4 KiB pages.
//! - [`AddressSpace::unmap`] returns every table frame below the root.
//! - [`AddressSpace::query`] / [`AddressSpace::translate`] walk the tree in
//!   software the way the MMU would.
//! - [`AddressSpace::activate`] writes `satp` and flushes the TLB.
//!
//! ## Safety
//!
//! - Mutating an active address space requires `sfence.vma` afterwards.
//! - The provided [`PhysMapper`] must yield **writable** references to table
//!   frames.

use crate::page_table::{EntryKind, Level, PageTable, PageTableEntry, TableIndex};
use crate::{FrameAlloc, PhysMapper, PteFlags};
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use kernel_registers::satp::Satp;
use log::{debug, trace, warn};

/// Rejected mapping requests. Nothing is written when one is returned,
/// except for intermediate tables already installed by earlier levels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("root table address is null")]
    NullRoot,
    #[error("virtual address 0 is reserved")]
    ZeroVirtualAddress,
    #[error("physical address 0 is reserved")]
    ZeroPhysicalAddress,
    #[error("flags {0:?} do not describe a leaf (need R, W or X)")]
    NotALeaf(PteFlags),
    #[error("page-table level {0} out of range 0..=2")]
    InvalidLevel(u8),
    #[error("range end {end} precedes start {start}")]
    InvalidRange {
        start: PhysicalAddress,
        end: PhysicalAddress,
    },
    #[error("a leaf at {0} sits above the requested level")]
    LeafInPath(Level),
    #[error("out of memory allocating the table below {0}")]
    OutOfMemory(Level),
}

/// A resolved translation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Mapping {
    /// Physical address including the in-page offset.
    pub phys: PhysicalAddress,
    pub flags: PteFlags,
    /// Level of the leaf that terminated the walk.
    pub level: Level,
}

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalPage<Size4K>,
    mapper: &'m M,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// View the tree rooted at `root`.
    ///
    /// # Errors
    /// [`MapError::NullRoot`] for the zero address.
    #[inline]
    pub fn from_root(mapper: &'m M, root: PhysicalAddress) -> Result<Self, MapError> {
        if root.is_zero() {
            return Err(MapError::NullRoot);
        }
        debug_assert!(root.is_aligned_to(PAGE_SIZE as u64), "root {root} not frame-aligned");
        Ok(Self {
            root: root.page::<Size4K>(),
            mapper,
        })
    }

    /// View the tree rooted at a frame already known to hold a table.
    #[inline]
    pub const fn from_root_page(mapper: &'m M, root: PhysicalPage<Size4K>) -> Self {
        Self { root, mapper }
    }

    /// Physical frame of the root table.
    #[inline]
    pub const fn root_page(&self) -> PhysicalPage<Size4K> {
        self.root
    }

    /// `satp` value selecting this tree under Sv39.
    #[inline]
    pub const fn satp(&self, asid: u16) -> Satp {
        Satp::sv39(self.root, asid)
    }

    /// Switch this hart to the address space and flush stale translations.
    ///
    /// # Safety
    /// Must run in S-mode, and the currently executing code, stack and data
    /// must be mapped in the target space.
    #[cfg(target_arch = "riscv64")]
    pub unsafe fn activate(&self, asid: u16) {
        use kernel_registers::StoreRegisterUnsafe;
        unsafe {
            self.satp(asid).store_unsafe();
            kernel_registers::satp::sfence_vma();
        }
    }

    #[inline]
    fn table(&self, page: PhysicalPage<Size4K>) -> &'m mut PageTable {
        // SAFETY: every page passed here is the root or a branch target,
        // both of which hold a `PageTable`.
        unsafe { self.mapper.phys_to_mut::<PageTable>(page.base()) }
    }

    /// Install a leaf `va → pa` with `flags` at `level` (0 = 4 KiB,
    /// 1 = 2 MiB, 2 = 1 GiB).
    ///
    /// Missing tables above `level` are allocated from `alloc`. An existing
    /// entry at the target slot is overwritten.
    ///
    /// # Errors
    /// - Argument errors: [`MapError::ZeroVirtualAddress`],
    ///   [`MapError::ZeroPhysicalAddress`], [`MapError::NotALeaf`],
    ///   [`MapError::InvalidLevel`].
    /// - [`MapError::LeafInPath`] when a larger leaf already covers `va`.
    /// - [`MapError::OutOfMemory`] when a table frame cannot be allocated.
    pub fn map<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        flags: PteFlags,
        level: u8,
    ) -> Result<(), MapError> {
        if va.is_zero() {
            return Err(MapError::ZeroVirtualAddress);
        }
        if pa.is_zero() {
            return Err(MapError::ZeroPhysicalAddress);
        }
        if !flags.is_leaf() {
            return Err(MapError::NotALeaf(flags));
        }
        let target = Level::try_from(level)?;

        let mut page = self.root;
        for level in Level::TOP_DOWN.into_iter().take_while(|l| *l > target) {
            let table = self.table(page);
            let index = level.index_of(va);
            page = match table.get(index).kind() {
                Some(EntryKind::Branch(next)) => next,
                Some(EntryKind::Leaf(..)) => return Err(MapError::LeafInPath(level)),
                None => {
                    let next = alloc.alloc_4k().ok_or(MapError::OutOfMemory(level))?;
                    self.table(next).clear();
                    table.set(index, PageTableEntry::branch(next));
                    trace!("{level}[{}] -> table {next}", index.as_usize());
                    next
                }
            };
        }

        let table = self.table(page);
        let index = target.index_of(va);
        if let Some(EntryKind::Branch(orphan)) = table.get(index).kind() {
            warn!("leaf {va} replaces the table {orphan} at {target}");
        }
        table.set(index, PageTableEntry::leaf(pa, flags));
        trace!("{target}[{}] = {va} -> {pa} {flags:?}", index.as_usize());
        Ok(())
    }

    /// Map `count` consecutive 4 KiB pages starting at `va → pa`.
    ///
    /// # Errors
    /// As [`map`](Self::map); pages before the failing one stay mapped.
    pub fn map_pages<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
        count: usize,
        flags: PteFlags,
    ) -> Result<(), MapError> {
        let mut offset = 0;
        for _ in 0..count {
            self.map(alloc, va + offset, pa + offset, flags, 0)?;
            offset += PAGE_SIZE as u64;
        }
        Ok(())
    }

    /// Identity-map every 4 KiB frame touching `[start, end)`.
    ///
    /// Returns the number of pages mapped.
    ///
    /// # Errors
    /// [`MapError::InvalidRange`] if `end < start` or rounding `end` up to a
    /// page boundary overflows; otherwise as [`map`](Self::map).
    pub fn map_identity_range<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        start: PhysicalAddress,
        end: PhysicalAddress,
        flags: PteFlags,
    ) -> Result<usize, MapError> {
        if end < start {
            return Err(MapError::InvalidRange { start, end });
        }
        let first = start.page::<Size4K>().base();
        let page = PAGE_SIZE as u64;
        let Some(last) = end.as_u64().div_ceil(page).checked_mul(page) else {
            return Err(MapError::InvalidRange { start, end });
        };
        #[allow(clippy::cast_possible_truncation)]
        let pages = ((last - first.as_u64()) / page) as usize;

        self.map_pages(alloc, VirtualAddress::new(first.as_u64()), first, pages, flags)?;
        debug!("identity-mapped {first}..{end} ({pages} pages, {flags:?})");
        Ok(pages)
    }

    /// Return every table frame below the root to `alloc` and clear the root
    /// entries that pointed at them. The root frame itself is untouched.
    ///
    /// Leaves stored directly in the root or in a level-1 table own no
    /// frames and are left in place.
    ///
    /// Returns the number of frames freed.
    pub fn unmap<A: FrameAlloc>(&self, alloc: &mut A) -> usize {
        let root = self.table(self.root);
        let mut freed = 0;

        for i2 in TableIndex::all() {
            let Some(EntryKind::Branch(l1_page)) = root.get(i2).kind() else {
                continue;
            };
            let l1 = self.table(l1_page);
            for (_, e1) in l1.iter() {
                if let Some(EntryKind::Branch(l0_page)) = e1.kind() {
                    alloc.free_4k(l0_page);
                    freed += 1;
                }
            }
            alloc.free_4k(l1_page);
            freed += 1;
            root.set(i2, PageTableEntry::invalid());
        }

        debug!("unmapped {}: {freed} table frames freed", self.root);
        freed
    }

    /// Software walk the way the MMU performs it; `None` on a miss.
    #[must_use]
    pub fn query(&self, va: VirtualAddress) -> Option<Mapping> {
        let mut page = self.root;
        for level in Level::TOP_DOWN {
            match self.table(page).get(level.index_of(va)).kind()? {
                EntryKind::Branch(next) => page = next,
                EntryKind::Leaf(base, flags) => {
                    let offset = va.page_offset(level.as_u8());
                    let frame = base.as_u64() & !(level.leaf_size() - 1);
                    let phys = PhysicalAddress::new(frame | offset);
                    return Some(Mapping { phys, flags, level });
                }
            }
        }
        // A branch in a level-0 table has nowhere to point.
        None
    }

    /// Physical address for `va`, or the reserved sentinel 0 on a miss.
    #[inline]
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> PhysicalAddress {
        self.query(va).map_or_else(PhysicalAddress::zero, |m| m.phys)
    }
}
