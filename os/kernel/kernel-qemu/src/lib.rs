//! # QEMU Debug Console
//!
//! Early diagnostic output for kernels running under `qemu-system-riscv64`.
//!
//! Characters are handed to the firmware through the legacy SBI
//! `console_putchar` call, which OpenSBI forwards to the first UART. The
//! path needs no driver, no heap and no page tables, so it works from the
//! first instruction of supervisor mode onwards.
//!
//! ```text
//! log::info!() ─► QemuLogger ─► qemu_trace! ─► QemuSink ─► ecall (a7 = 1) ─► UART
//! ```
//!
//! ## Features
//!
//! * `enabled` (default): output is compiled in. On targets other than
//!   `riscv64` the sink still formats but discards every byte, which keeps
//!   host-side unit tests of logging code cheap.
//! * Without `enabled` the macro expands to a no-op.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kernel_qemu::QemuLogger;
//! use log::{LevelFilter, info};
//!
//! QemuLogger::new(LevelFilter::Debug).init().expect("logger installed once");
//! info!("memory subsystem online");
//! ```
//!
//! Host side:
//!
//! ```bash
//! qemu-system-riscv64 -machine virt -nographic -bios default -kernel kernel.elf
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::QemuLogger;

#[cfg(feature = "enabled")]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};

    /// Legacy SBI extension ID of `sbi_console_putchar`.
    const SBI_CONSOLE_PUTCHAR: usize = 1;

    /// Write a single byte to the firmware console.
    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub fn dbg_putc(c: u8) {
        unsafe { sbi_putchar(c) }
    }

    #[cfg(target_arch = "riscv64")]
    #[allow(clippy::inline_always)]
    #[inline(always)]
    unsafe fn sbi_putchar(c: u8) {
        unsafe {
            core::arch::asm!(
                "ecall",
                inlateout("a0") usize::from(c) => _,
                in("a7") SBI_CONSOLE_PUTCHAR,
                options(nostack, preserves_flags)
            );
        }
    }

    #[cfg(not(target_arch = "riscv64"))]
    #[allow(clippy::inline_always)]
    #[inline(always)]
    const unsafe fn sbi_putchar(_c: u8) {
        let _ = SBI_CONSOLE_PUTCHAR;
    }

    pub struct QemuSink;

    impl Write for QemuSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for b in s.bytes() {
                dbg_putc(b);
            }
            Ok(())
        }

        #[inline]
        fn write_char(&mut self, c: char) -> fmt::Result {
            let mut buf = [0u8; 4];
            let s = c.encode_utf8(&mut buf);
            self.write_str(s)
        }
    }

    #[doc(hidden)]
    #[inline(always)]
    #[allow(clippy::inline_always)]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best effort; the console has no way to report failure.
        let _ = fmt::write(&mut QemuSink, args);
    }
}

#[cfg(not(feature = "enabled"))]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt;

    #[doc(hidden)]
    #[inline(always)]
    #[allow(clippy::inline_always)]
    pub const fn qemu_write(_: fmt::Arguments) {}
}

/// Formats its arguments straight to the firmware console.
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
