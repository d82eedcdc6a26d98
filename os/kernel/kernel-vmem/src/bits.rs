//! # Sv39 Permission Bits
//!
//! The low byte of every page-table entry. The same constants are used by
//! process creation to describe user mappings, so they are exposed as a
//! single [`PteFlags`] vocabulary.
//!
//! | Bit | Name | Meaning |
//! |----:|:-----|:--------|
//! | 0 | `V` | Entry is valid. |
//! | 1 | `R` | Readable. |
//! | 2 | `W` | Writable (requires `R`). |
//! | 3 | `X` | Executable. |
//! | 4 | `U` | Accessible from U-mode. |
//! | 5 | `G` | Global mapping, present in every address space. |
//! | 6 | `A` | Accessed. |
//! | 7 | `D` | Dirty. |
//!
//! An entry with `V` set and none of `R`/`W`/`X` is a **branch** pointing at
//! the next lower table; with any of them set it is a **leaf**.

bitflags::bitflags! {
    /// Permission and status bits of a page-table entry.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct PteFlags: u64 {
        const VALID   = 1 << 0;
        const READ    = 1 << 1;
        const WRITE   = 1 << 2;
        const EXECUTE = 1 << 3;
        const USER    = 1 << 4;
        const GLOBAL  = 1 << 5;
        /// Set by hardware (or eagerly by software) on access.
        const ACCESS  = 1 << 6;
        /// Set by hardware (or eagerly by software) on write.
        const DIRTY   = 1 << 7;

        const RW  = Self::READ.bits() | Self::WRITE.bits();
        const RX  = Self::READ.bits() | Self::EXECUTE.bits();
        const RWX = Self::READ.bits() | Self::WRITE.bits() | Self::EXECUTE.bits();

        const USER_RW  = Self::USER.bits() | Self::RW.bits();
        const USER_RX  = Self::USER.bits() | Self::RX.bits();
        const USER_RWX = Self::USER.bits() | Self::RWX.bits();
    }
}

impl PteFlags {
    /// Mask of the bits stored in the low byte of an entry.
    pub const LOW_BYTE: u64 = 0xFF;

    /// Any of `R`/`W`/`X` set.
    #[inline]
    #[must_use]
    pub const fn is_leaf(self) -> bool {
        self.intersects(Self::RWX)
    }

    /// Flags decoded from a raw entry; PPN bits are ignored.
    #[inline]
    #[must_use]
    pub const fn from_entry_bits(raw: u64) -> Self {
        Self::from_bits_truncate(raw & Self::LOW_BYTE)
    }
}
