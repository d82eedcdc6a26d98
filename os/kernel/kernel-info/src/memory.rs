//! # Memory Layout Constants

/// log2 of the frame size.
pub const PAGE_ORDER: u32 = 12;

/// Size of a physical frame in bytes.
pub const PAGE_SIZE: usize = 1 << PAGE_ORDER;

/// Number of frames the byte-grained heap reserves at init.
pub const KMEM_PAGES: usize = 64;

/// Alignment (and size granularity) of heap payloads.
pub const HEAP_ALIGN: usize = 8;

/// Number of entries in one page-table node.
pub const PT_ENTRIES: usize = 512;

/// Start of DRAM on the QEMU `virt` machine; the kernel image is loaded here.
pub const DRAM_BASE: u64 = 0x8000_0000;

/// NS16550A UART registers.
pub const UART_BASE: u64 = 0x1000_0000;
pub const UART_LEN: u64 = 0x100;

/// Platform-level interrupt controller.
pub const PLIC_BASE: u64 = 0x0c00_0000;
pub const PLIC_LEN: u64 = 0x0400_0000;

/// Core-local interruptor (`mtime`, `mtimecmp`).
pub const CLINT_BASE: u64 = 0x0200_0000;
pub const CLINT_LEN: u64 = 0x0001_0000;

/// Test/power-control device.
pub const SYSCON_BASE: u64 = 0x0010_0000;
pub const SYSCON_LEN: u64 = 0x1000;

/// MMIO windows the kernel identity-maps read/write at bring-up,
/// as `(name, base, len)`.
pub const MMIO_WINDOWS: [(&str, u64, u64); 4] = [
    ("syscon", SYSCON_BASE, SYSCON_LEN),
    ("clint", CLINT_BASE, CLINT_LEN),
    ("plic", PLIC_BASE, PLIC_LEN),
    ("uart", UART_BASE, UART_LEN),
];

const _: () = assert!(PAGE_SIZE.is_power_of_two());
const _: () = assert!(PT_ENTRIES * 8 == PAGE_SIZE);
const _: () = assert!(HEAP_ALIGN.is_power_of_two());
