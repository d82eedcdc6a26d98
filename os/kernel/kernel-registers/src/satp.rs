#[cfg(all(feature = "asm", target_arch = "riscv64"))]
use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// `satp`: Supervisor Address Translation and Protection.
///
/// Selects the translation scheme and holds the physical page number of the
/// root page table. Writing it does not flush the TLB; follow up with
/// [`sfence_vma`].
#[bitfield(u64)]
pub struct Satp {
    /// Bits 0–43: PPN of the root page table (`root_phys >> 12`).
    #[bits(44)]
    pub ppn: u64,

    /// Bits 44–59: Address-space identifier.
    #[bits(16)]
    pub asid: u16,

    /// Bits 60–63: Translation mode, see [`SatpMode`].
    #[bits(4)]
    mode_bits: u8,
}

/// Values of the `satp.MODE` field for RV64.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum SatpMode {
    /// No translation.
    Bare = 0,
    /// 3-level, 39-bit virtual addresses.
    Sv39 = 8,
    /// 4-level, 48-bit virtual addresses.
    Sv48 = 9,
}

impl SatpMode {
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Bare),
            8 => Some(Self::Sv39),
            9 => Some(Self::Sv48),
            _ => None,
        }
    }
}

impl Satp {
    /// Sv39 translation rooted at `root` for address space `asid`.
    #[must_use]
    pub const fn sv39(root: PhysicalPage<Size4K>, asid: u16) -> Self {
        Self::new()
            .with_ppn(root.number())
            .with_asid(asid)
            .with_mode_bits(SatpMode::Sv39 as u8)
    }

    /// Translation disabled.
    #[must_use]
    pub const fn bare() -> Self {
        Self::new()
    }

    /// Decoded mode, or `None` for a reserved encoding.
    #[must_use]
    pub const fn mode(&self) -> Option<SatpMode> {
        SatpMode::from_bits(self.mode_bits())
    }

    pub fn set_mode(&mut self, mode: SatpMode) {
        self.set_mode_bits(mode as u8);
    }

    /// Physical address of the root page table.
    #[must_use]
    pub const fn root_phys(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.ppn() << 12)
    }
}

#[cfg(all(feature = "asm", target_arch = "riscv64"))]
impl LoadRegisterUnsafe for Satp {
    unsafe fn load_unsafe() -> Self {
        let satp: u64;
        unsafe {
            core::arch::asm!(
                "csrr {}, satp",
                out(reg) satp,
                options(nomem, nostack, preserves_flags)
            );
        }
        Self::from_bits(satp)
    }
}

#[cfg(all(feature = "asm", target_arch = "riscv64"))]
impl StoreRegisterUnsafe for Satp {
    unsafe fn store_unsafe(self) {
        let satp = self.into_bits();
        unsafe {
            core::arch::asm!("csrw satp, {}", in(reg) satp, options(nostack, preserves_flags));
        }
    }
}

/// Flush all address-translation caches on this hart.
///
/// # Safety
/// Requires supervisor mode.
#[cfg(all(feature = "asm", target_arch = "riscv64"))]
#[inline]
pub unsafe fn sfence_vma() {
    unsafe {
        core::arch::asm!("sfence.vma zero, zero", options(nostack, preserves_flags));
    }
}

/// Flush all address-translation caches on this hart.
///
/// # Safety
/// Always safe on non-riscv hosts, where it does nothing.
#[cfg(not(all(feature = "asm", target_arch = "riscv64")))]
#[inline]
pub const unsafe fn sfence_vma() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sv39_encoding() {
        let root = PhysicalPage::<Size4K>::from_number(0x8_0123);
        let satp = Satp::sv39(root, 7);
        assert_eq!(satp.into_bits(), (8 << 60) | (7 << 44) | 0x8_0123);
        assert_eq!(satp.mode(), Some(SatpMode::Sv39));
        assert_eq!(satp.root_phys().as_u64(), 0x8012_3000);
    }

    #[test]
    fn bare_and_reserved_modes() {
        assert_eq!(Satp::bare().mode(), Some(SatpMode::Bare));
        let reserved = Satp::from_bits(3 << 60);
        assert_eq!(reserved.mode(), None);

        let mut satp = Satp::bare();
        satp.set_mode(SatpMode::Sv48);
        assert_eq!(satp.into_bits() >> 60, 9);
    }
}
