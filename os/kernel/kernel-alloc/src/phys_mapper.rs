//! # Identity [`PhysMapper`] over the managed region
//!
//! The memory core runs with translation off (or under an identity map), so a
//! physical address is directly usable as a pointer. Page tables only ever
//! live in frames of the managed region, which is what this mapper checks.
//!
//! ## Example
//! ```rust
//! # use core::ptr::NonNull;
//! # use kernel_alloc::{phys_mapper::IdentityMapper, region::RawRegion};
//! # use kernel_vmem::{PageTable, PhysMapper};
//! # #[repr(align(4096))] struct Frame([u8; 4096]);
//! let frame = Box::leak(Box::new(Frame([0; 4096])));
//! let base = NonNull::from(&mut frame.0).cast::<u8>();
//! let region = unsafe { RawRegion::from_raw_parts(base, 4096) };
//! let mapper = IdentityMapper::new(region);
//! let table: &mut PageTable = unsafe { mapper.phys_to_mut(region.start()) };
//! assert_eq!(table.valid_entries(), 0);
//! ```

use crate::fatal::fatal_assert;
use crate::region::RawRegion;
use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] for physical == virtual, restricted to one region.
#[derive(Copy, Clone, Debug)]
pub struct IdentityMapper {
    region: RawRegion,
}

impl IdentityMapper {
    #[must_use]
    pub const fn new(region: RawRegion) -> Self {
        Self { region }
    }

    #[must_use]
    pub const fn region(&self) -> RawRegion {
        self.region
    }
}

impl PhysMapper for IdentityMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let offset = self.region.offset_of(pa);
        fatal_assert!(
            offset.is_some_and(|o| o + size_of::<T>() <= self.region.len()),
            "{pa} holds a {}-byte object inside the managed region",
            size_of::<T>()
        );
        let ptr = self.region.ptr_at(offset.unwrap_or_default()).cast::<T>();
        // SAFETY: in bounds; the caller guarantees the bytes are a `T`.
        unsafe { &mut *ptr.as_ptr() }
    }
}
