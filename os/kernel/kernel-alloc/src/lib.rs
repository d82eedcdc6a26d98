//! # Kernel Memory Allocation
//!
//! Physical memory management for the kernel: a page-frame allocator over the
//! managed region, a byte-grained heap carved from its frames, and the
//! glue that lets the Sv39 translation manager in `kernel-vmem` draw page
//! table frames from the same pool.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────┐   ┌──────────────────────────────────┐
//! │  Byte-grained heap       │   │  Address spaces (kernel-vmem)    │
//! │  • first-fit, in-band    │   │  • Sv39 tables, lazily allocated │
//! │    8-byte headers        │   │  • IdentityMapper                │
//! │  • coalescing free       │   │                                  │
//! └────────────┬─────────────┘   └────────────────┬─────────────────┘
//!              │ KMEM_PAGES frames + root table   │ one frame per table
//! ┌────────────▼──────────────────────────────────▼─────────────────┐
//! │                    Page-frame allocator                         │
//! │  • one descriptor byte per 4 KiB frame (TAKEN, LAST)            │
//! │  • first-fit runs, zeroed on allocation                         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The heap and the translation manager never call each other; both only
//! depend on the frame allocator.
//!
//! ## Core Components
//!
//! - [`frame_alloc`]: [`PageFrameAllocator`](frame_alloc::PageFrameAllocator)
//! - [`heap`]: [`Heap`](heap::Heap) with [`BlockHeader`](heap::BlockHeader)
//! - [`region`]: [`RawRegion`](region::RawRegion), every metadata access is
//!   bounds-checked through it
//! - [`phys_mapper`]: [`IdentityMapper`](phys_mapper::IdentityMapper)
//! - [`kmem`]: the lock-guarded [`KernelMemory`](kmem::KernelMemory) and the
//!   process-wide instance
//! - [`global_alloc`]: [`KernelHeapAllocator`](global_alloc::KernelHeapAllocator)
//!
//! ## Failure model
//!
//! Exhaustion and bad arguments come back as typed errors. Corrupted
//! metadata (a double free of frames, a zero-sized heap block, a pointer
//! outside the managed memory) is logged and halts.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod fatal;

pub mod frame_alloc;
pub mod global_alloc;
pub mod heap;
pub mod kmem;
pub mod phys_mapper;
pub mod region;

pub use frame_alloc::{FrameAllocError, PageFrameAllocator};
pub use heap::{Heap, HeapError};
pub use kmem::{KernelMemory, KernelMemoryError};
pub use region::RawRegion;
