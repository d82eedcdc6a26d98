use core::fmt;
use core::hash::Hash;

/// Sealed trait pattern to restrict `PageSize` impls to our markers.
mod sealed {
    pub trait Sealed {}
}

/// Marker trait for the page sizes an Sv39 leaf entry can map.
///
/// Each size corresponds to the page-table level at which the leaf lives:
/// a leaf at level `i` maps `2^(12 + 9 * i)` bytes.
pub trait PageSize:
    sealed::Sealed
    + Clone
    + Copy
    + Eq
    + PartialEq
    + Ord
    + PartialOrd
    + Hash
    + fmt::Display
    + fmt::Debug
{
    /// Page size in bytes (power of two).
    const SIZE: u64;
    /// log2(SIZE), i.e., number of low bits used for the offset.
    const SHIFT: u32;
    /// Page-table level holding a leaf of this size (0 = finest).
    const LEVEL: u8;

    fn as_str() -> &'static str;
}

macro_rules! page_size {
    ($(#[$meta:meta])* $name:ident, shift = $shift:literal, level = $level:literal, $label:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl PageSize for $name {
            const SIZE: u64 = 1 << $shift;
            const SHIFT: u32 = $shift;
            const LEVEL: u8 = $level;

            fn as_str() -> &'static str {
                $label
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(Self::as_str())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Display::fmt(&self, f)
            }
        }
    };
}

page_size!(
    /// 4 KiB page, the base frame size (level-0 leaf).
    Size4K, shift = 12, level = 0, "4K"
);

page_size!(
    /// 2 MiB megapage (level-1 leaf).
    Size2M, shift = 21, level = 1, "2M"
);

page_size!(
    /// 1 GiB gigapage (level-2 leaf).
    Size1G, shift = 30, level = 2, "1G"
);
