//! # Kernel Memory Layout and Bring-Up Interface
//!
//! This crate is the single source of truth for the constants and hand-off
//! types shared between the boot code and the memory core.
//!
//! ## Modules
//!
//! ### Memory Layout ([`memory`])
//! * **Frame geometry**: `PAGE_ORDER`, `PAGE_SIZE`
//! * **Heap sizing**: `KMEM_PAGES` frames reserved for the byte heap
//! * **Platform map**: DRAM and MMIO windows of the QEMU `virt` machine
//!
//! ### Boot Hand-Off ([`boot`])
//! * [`MemoryRange`](boot::MemoryRange): a half-open `[start, end)` range
//! * [`KernelImageLayout`](boot::KernelImageLayout): linker-provided section
//!   bounds, passed by bring-up code next to the managed heap region
//!
//! ## Physical Memory Layout (QEMU `virt`)
//!
//! ```text
//! 0x0010_0000 ┌──────────────────────────────┐ SYSCON (power control)
//! 0x0200_0000 ├──────────────────────────────┤ CLINT (timer)
//! 0x0c00_0000 ├──────────────────────────────┤ PLIC (interrupts)
//! 0x1000_0000 ├──────────────────────────────┤ UART (NS16550A)
//! 0x8000_0000 ├──────────────────────────────┤ DRAM_BASE
//!             │  kernel text/rodata/data/bss │
//!             │  kernel stack                │
//! HEAP_START  ├──────────────────────────────┤
//!             │  page descriptors (1 B/frame)│
//!             │  4 KiB frames                │
//! HEAP_END    └──────────────────────────────┘
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod boot;
pub mod memory;
