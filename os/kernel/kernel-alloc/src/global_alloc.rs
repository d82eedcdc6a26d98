//! # `GlobalAlloc` adapter over the kernel heap
//!
//! Lets `alloc::boxed::Box`, `Vec` and friends draw from the process-wide
//! [`Heap`](crate::heap::Heap) once [`kmem::init`](crate::kmem::init) has run.
//! The library does not register it; bring-up does:
//!
//! ```rust,ignore
//! #[global_allocator]
//! static ALLOCATOR: KernelHeapAllocator = KernelHeapAllocator;
//! ```
//!
//! ## Constraints
//! - Payloads are 8-byte aligned; layouts asking for more get null.
//! - Before `kmem::init` every allocation returns null.

use crate::kmem;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{NonNull, null_mut};
use kernel_info::memory::HEAP_ALIGN;

/// Stateless handle to the process-wide kernel heap.
#[derive(Debug, Default, Copy, Clone)]
pub struct KernelHeapAllocator;

unsafe impl GlobalAlloc for KernelHeapAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > HEAP_ALIGN {
            return null_mut();
        }
        kmem::get()
            .and_then(|k| k.kmalloc(layout.size()).ok())
            .map_or(null_mut(), NonNull::as_ptr)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > HEAP_ALIGN {
            return null_mut();
        }
        kmem::get()
            .and_then(|k| k.kcalloc(1, layout.size()).ok())
            .map_or(null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if let (Some(k), Some(ptr)) = (kmem::get(), NonNull::new(ptr)) {
            k.kfree(ptr);
        }
    }
}
