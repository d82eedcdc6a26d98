//! # Sv39 Page-Table Nodes
//!
//! - [`PageTableEntry`]: the 64-bit entry, with PPN split into three fields.
//! - [`EntryKind`]: decoded view, either a branch or a leaf.
//! - [`Level`]: tree level (2 = root ... 0 = finest).
//! - [`TableIndex`]: 9-bit slot index into one node.
//! - [`PageTable`]: a 4 KiB-aligned node of 512 entries.
//!
//! ## Entry layout
//!
//! ```text
//! 63      54 53        28 27      19 18      10 9  8 7 6 5 4 3 2 1 0
//! ┌─────────┬────────────┬──────────┬──────────┬────┬─┬─┬─┬─┬─┬─┬─┬─┐
//! │reserved │ PPN[2] (26)│PPN[1] (9)│PPN[0] (9)│RSW │D│A│G│U│X│W│R│V│
//! └─────────┴────────────┴──────────┴──────────┴────┴─┴─┴─┴─┴─┴─┴─┴─┘
//! ```

use crate::{MapError, PteFlags};
use bitfield_struct::bitfield;
use core::fmt;
use kernel_info::memory::PT_ENTRIES;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

/// A single Sv39 page-table entry.
#[doc(alias = "PTE")]
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageTableEntry {
    pub valid: bool,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub user: bool,
    pub global: bool,
    pub accessed: bool,
    pub dirty: bool,

    /// Reserved for supervisor software.
    #[bits(2)]
    pub rsw: u8,

    #[bits(9)]
    pub ppn0: u16,
    #[bits(9)]
    pub ppn1: u16,
    #[bits(26)]
    pub ppn2: u32,

    #[bits(10)]
    __: u16,
}

/// Decoded meaning of a valid entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntryKind {
    /// Points at the next lower table, which the parent exclusively owns.
    Branch(PhysicalPage<Size4K>),
    /// Terminates translation at this level.
    Leaf(PhysicalAddress, PteFlags),
}

impl PageTableEntry {
    #[inline]
    #[must_use]
    pub const fn invalid() -> Self {
        Self::new()
    }

    /// Valid entry pointing at `table`, no permission bits.
    #[inline]
    #[must_use]
    pub const fn branch(table: PhysicalPage<Size4K>) -> Self {
        Self::new()
            .with_valid(true)
            .with_physical_address(table.base())
    }

    /// Valid leaf for `pa` with `flags`; the in-page offset of `pa` is dropped.
    #[inline]
    #[must_use]
    pub const fn leaf(pa: PhysicalAddress, flags: PteFlags) -> Self {
        let low = flags.bits() | PteFlags::VALID.bits();
        Self::from_bits(low & PteFlags::LOW_BYTE).with_physical_address(pa)
    }

    /// Replace the PPN fields with the frame containing `pa`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_physical_address(self, pa: PhysicalAddress) -> Self {
        self.with_ppn0(pa.ppn_field(0) as u16)
            .with_ppn1(pa.ppn_field(1) as u16)
            .with_ppn2(pa.ppn_field(2) as u32)
    }

    /// Full 44-bit physical page number.
    #[inline]
    #[must_use]
    pub const fn ppn(self) -> u64 {
        ((self.ppn2() as u64) << 18) | ((self.ppn1() as u64) << 9) | self.ppn0() as u64
    }

    /// Base address of the frame this entry refers to.
    #[inline]
    #[must_use]
    pub const fn physical_address(self) -> PhysicalAddress {
        PhysicalAddress::new(self.ppn() << 12)
    }

    #[inline]
    #[must_use]
    pub const fn flags(self) -> PteFlags {
        PteFlags::from_entry_bits(self.into_bits())
    }

    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.valid()
    }

    /// `None` for invalid entries.
    #[inline]
    #[must_use]
    pub const fn kind(self) -> Option<EntryKind> {
        if !self.valid() {
            return None;
        }
        let flags = self.flags();
        if flags.is_leaf() {
            Some(EntryKind::Leaf(self.physical_address(), flags))
        } else {
            Some(EntryKind::Branch(PhysicalPage::from_number(self.ppn())))
        }
    }
}

/// Tree level; the root is [`Level::L2`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum Level {
    /// 4 KiB leaves.
    L0 = 0,
    /// 2 MiB leaves.
    L1 = 1,
    /// 1 GiB leaves; root table.
    L2 = 2,
}

impl Level {
    /// Walk order, root first.
    pub const TOP_DOWN: [Self; 3] = [Self::L2, Self::L1, Self::L0];

    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Slot of `va` in a table at this level.
    #[inline]
    #[must_use]
    pub const fn index_of(self, va: VirtualAddress) -> TableIndex {
        TableIndex::new(va.vpn(self.as_u8()))
    }

    /// Bytes mapped by a leaf at this level.
    #[inline]
    #[must_use]
    pub const fn leaf_size(self) -> u64 {
        1 << (12 + 9 * self.as_u8() as u32)
    }
}

impl TryFrom<u8> for Level {
    type Error = MapError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::L0),
            1 => Ok(Self::L1),
            2 => Ok(Self::L2),
            other => Err(MapError::InvalidLevel(other)),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level {}", self.as_u8())
    }
}

/// Index into one table node, `0..512`.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    /// ### Debug assertions
    /// - Asserts `v < 512` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < PT_ENTRIES);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Every slot of a node, in order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn all() -> impl Iterator<Item = Self> {
        (0..PT_ENTRIES as u16).map(Self)
    }
}

/// One page-table node: 512 entries, 4 KiB-aligned.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; PT_ENTRIES],
}

const _: () = assert!(size_of::<PageTable>() == 4096);

impl PageTable {
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageTableEntry::invalid(); PT_ENTRIES],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PageTableEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PageTableEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Invalidate every entry.
    #[inline]
    pub fn clear(&mut self) {
        self.entries.fill(PageTableEntry::invalid());
    }

    /// All slots with their current entry.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (TableIndex, PageTableEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (TableIndex::new(i as u16), *e))
    }

    /// Number of valid entries.
    #[must_use]
    pub fn valid_entries(&self) -> usize {
        self.entries.iter().filter(|e| e.is_valid()).count()
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_encoding_splits_ppn() {
        let pa = PhysicalAddress::new(0x8020_3000);
        let e = PageTableEntry::leaf(pa, PteFlags::RX);
        // ppn = 0x80203 -> [2]=0x2, [1]=0x1, [0]=0x3
        assert_eq!(e.ppn2(), 0x2);
        assert_eq!(e.ppn1(), 0x1);
        assert_eq!(e.ppn0(), 0x3);
        assert_eq!(e.into_bits(), (0x80203 << 10) | 0b1011);
        assert_eq!(e.physical_address(), pa);
        assert_eq!(e.kind(), Some(EntryKind::Leaf(pa, PteFlags::RX | PteFlags::VALID)));
    }

    #[test]
    fn branch_has_no_permissions() {
        let page = PhysicalPage::<Size4K>::from_number(0x8_1234);
        let e = PageTableEntry::branch(page);
        assert!(e.valid());
        assert!(!e.flags().is_leaf());
        assert_eq!(e.into_bits() & 0xFF, 0x01);
        assert_eq!(e.kind(), Some(EntryKind::Branch(page)));
    }

    #[test]
    fn invalid_entry_decodes_to_none() {
        assert_eq!(PageTableEntry::invalid().kind(), None);
        // R/W/X without V is still invalid.
        assert_eq!(PageTableEntry::from_bits(0x0E).kind(), None);
    }

    #[test]
    fn maximum_ppn_round_trips() {
        let pa = PhysicalAddress::new(0x00FF_FFFF_FFFF_F000);
        let e = PageTableEntry::leaf(pa, PteFlags::READ);
        assert_eq!(e.ppn(), (1 << 44) - 1);
        assert_eq!(e.physical_address(), pa);
    }

    #[test]
    fn level_conversions() {
        assert_eq!(Level::try_from(2), Ok(Level::L2));
        assert_eq!(Level::try_from(3), Err(MapError::InvalidLevel(3)));
        assert_eq!(Level::L1.leaf_size(), 2 * 1024 * 1024);
        assert!(Level::L0 < Level::L2);
    }

    #[test]
    fn table_set_get() {
        let mut t = PageTable::zeroed();
        let e = PageTableEntry::leaf(PhysicalAddress::new(0x1000), PteFlags::RW);
        t.set(TableIndex::new(511), e);
        assert_eq!(t.get(TableIndex::new(511)), e);
        assert_eq!(t.valid_entries(), 1);
        t.clear();
        assert_eq!(t.valid_entries(), 0);
    }
}
