//! # Bring-Up Hand-Off Types
//!
//! The linker script exports symbol pairs for every kernel section; bring-up
//! code packs them into a [`KernelImageLayout`] before initializing memory.

use core::fmt;
use kernel_memory_addresses::PhysicalAddress;

/// Half-open physical range `[start, end)`.
#[repr(C)]
#[derive(Copy, Clone, Default, Eq, PartialEq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.start)
    }

    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.end)
    }

    /// Length in bytes; zero for inverted ranges.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn contains(&self, addr: u64) -> bool {
        self.start <= addr && addr < self.end
    }
}

impl fmt::Debug for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start, self.end)
    }
}

/// What a kernel section is used for; decides its page permissions.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SectionKind {
    /// Executable, read-only.
    Code,
    /// Read-only data.
    ReadOnly,
    /// Read/write data (`.data`, `.bss`, stacks, the heap).
    ReadWrite,
}

/// Section bounds of the loaded kernel image.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default)]
pub struct KernelImageLayout {
    pub text: MemoryRange,
    pub rodata: MemoryRange,
    pub data: MemoryRange,
    pub bss: MemoryRange,
    pub kernel_stack: MemoryRange,
}

impl KernelImageLayout {
    /// All image sections with their name and kind, in address order.
    #[must_use]
    pub const fn sections(&self) -> [(&'static str, MemoryRange, SectionKind); 5] {
        [
            (".text", self.text, SectionKind::Code),
            (".rodata", self.rodata, SectionKind::ReadOnly),
            (".data", self.data, SectionKind::ReadWrite),
            (".bss", self.bss, SectionKind::ReadWrite),
            ("stack", self.kernel_stack, SectionKind::ReadWrite),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_basics() {
        let r = MemoryRange::new(0x8000_0000, 0x8000_2000);
        assert_eq!(r.len(), 0x2000);
        assert!(r.contains(0x8000_1fff));
        assert!(!r.contains(0x8000_2000));
        assert!(MemoryRange::new(10, 5).is_empty());
    }

    #[test]
    fn sections_are_listed_with_kinds() {
        let layout = KernelImageLayout {
            text: MemoryRange::new(0x8000_0000, 0x8000_4000),
            ..KernelImageLayout::default()
        };
        let sections = layout.sections();
        assert_eq!(sections[0].0, ".text");
        assert_eq!(sections[0].2, SectionKind::Code);
        assert_eq!(sections[4].0, "stack");
        assert_eq!(sections[4].2, SectionKind::ReadWrite);
    }
}
