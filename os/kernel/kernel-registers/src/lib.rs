//! # Typed RISC-V Control and Status Registers
//!
//! Only the CSRs the memory core touches are modeled. Actual `csrr`/`csrw`
//! access is compiled in with the `asm` feature on `riscv64` targets; on any
//! other target the types remain usable as plain bit containers.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "satp")]
pub mod satp;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require supervisor mode.
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require supervisor mode.
    unsafe fn store_unsafe(self);
}
