//! # Kernel memory context
//!
//! [`KernelMemory`] bundles the frame allocator, the heap and the default
//! address space, each behind its own [`SpinLock`]. Page tables of other
//! address spaces live in [`SpinLock<RootTable>`] handles owned by their
//! processes.
//!
//! Lock order: an address-space lock first, then the frame-allocator lock.
//! The heap lock is never held together with either.
//!
//! Bring-up calls [`init`] once; afterwards the free functions in this
//! module ([`kmalloc`], [`alloc_pages`], ...) reach the process-wide
//! instance.

use crate::fatal::fatal;
use crate::frame_alloc::{FrameAllocError, PageFrameAllocator};
use crate::heap::{Heap, HeapError};
use crate::phys_mapper::IdentityMapper;
use crate::region::RawRegion;
use core::ptr::NonNull;
use kernel_info::boot::{KernelImageLayout, SectionKind};
use kernel_info::memory::MMIO_WINDOWS;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_sync::{SpinLock, SyncOnceCell};
use kernel_vmem::{AddressSpace, FrameAlloc, MapError, PteFlags};
use log::info;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelMemoryError {
    #[error(transparent)]
    Frames(#[from] FrameAllocError),
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error("kernel memory is already initialized")]
    AlreadyInitialized,
}

/// Root frame of one address space.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RootTable {
    page: PhysicalPage<Size4K>,
}

impl RootTable {
    #[must_use]
    pub const fn page(&self) -> PhysicalPage<Size4K> {
        self.page
    }
}

pub struct KernelMemory {
    mapper: IdentityMapper,
    frames: SpinLock<PageFrameAllocator>,
    heap: SpinLock<Heap>,
    /// Fixed after `new`; the lock below serializes edits to its tree.
    kernel_root: RootTable,
    kernel_space: SpinLock<RootTable>,
}

impl KernelMemory {
    /// Format `region` for frames, then reserve and format the heap.
    ///
    /// # Errors
    /// Propagates frame-allocator and heap initialization failures.
    pub fn new(region: RawRegion) -> Result<Self, KernelMemoryError> {
        let mut frames = PageFrameAllocator::init(region)?;
        let heap = Heap::init(&mut frames)?;
        let kernel_space = RootTable {
            page: heap.root_table().page::<Size4K>(),
        };
        Ok(Self {
            mapper: IdentityMapper::new(region),
            frames: SpinLock::new(frames),
            heap: SpinLock::new(heap),
            kernel_root: kernel_space,
            kernel_space: SpinLock::new(kernel_space),
        })
    }

    /// # Errors
    /// See [`PageFrameAllocator::alloc`].
    pub fn alloc_pages(&self, n: usize) -> Result<PhysicalAddress, FrameAllocError> {
        self.frames.lock().alloc(n)
    }

    /// # Errors
    /// See [`PageFrameAllocator::alloc_one`].
    pub fn alloc_page(&self) -> Result<PhysicalAddress, FrameAllocError> {
        self.frames.lock().alloc_one()
    }

    /// See [`PageFrameAllocator::dealloc`].
    pub fn dealloc_pages(&self, pa: PhysicalAddress) -> usize {
        self.frames.lock().dealloc(pa)
    }

    /// # Errors
    /// See [`Heap::malloc`].
    pub fn kmalloc(&self, size: usize) -> Result<NonNull<u8>, HeapError> {
        self.heap.lock().malloc(size)
    }

    /// # Errors
    /// See [`Heap::calloc`].
    pub fn kcalloc(&self, n: usize, size: usize) -> Result<NonNull<u8>, HeapError> {
        self.heap.lock().calloc(n, size)
    }

    /// See [`Heap::free`].
    pub fn kfree(&self, ptr: NonNull<u8>) {
        self.heap.lock().free(ptr);
    }

    /// Direct access to the frame allocator.
    pub fn with_frames<R>(&self, f: impl FnOnce(&mut PageFrameAllocator) -> R) -> R {
        self.frames.with_lock(f)
    }

    /// Direct access to the heap.
    pub fn with_heap<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> R {
        self.heap.with_lock(f)
    }

    /// Root frame of the default (kernel) address space.
    ///
    /// Takes no lock, so it may be called from inside
    /// [`with_kernel_space`](Self::with_kernel_space).
    #[must_use]
    pub const fn kernel_root(&self) -> RootTable {
        self.kernel_root
    }

    /// Allocate a zeroed root frame for a new address space.
    ///
    /// # Errors
    /// [`FrameAllocError::OutOfFrames`] if no frame is free.
    pub fn create_address_space(&self) -> Result<SpinLock<RootTable>, FrameAllocError> {
        let pa = self.alloc_page()?;
        Ok(SpinLock::new(RootTable {
            page: pa.page::<Size4K>(),
        }))
    }

    /// Free every table of `space`, then its root frame. Returns the number
    /// of frames released, root included.
    pub fn destroy_address_space(&self, space: SpinLock<RootTable>) -> usize {
        let root = space.into_inner();
        let mut frames = self.frames.lock();
        let aspace = AddressSpace::from_root_page(&self.mapper, root.page);
        let tables = aspace.unmap(&mut *frames);
        frames.free_4k(root.page);
        tables + 1
    }

    /// Run `f` on the kernel address space with the frame allocator locked.
    pub fn with_kernel_space<R>(
        &self,
        f: impl FnOnce(&AddressSpace<'_, IdentityMapper>, &mut PageFrameAllocator) -> R,
    ) -> R {
        self.with_space(&self.kernel_space, f)
    }

    /// Run `f` on `space` with the frame allocator locked.
    ///
    /// `space` and the frame allocator stay locked while `f` runs: `f` must
    /// not call any locking `KernelMemory` method (`alloc_*`, `with_frames`,
    /// `with_space`, ...) or the hart spins forever.
    pub fn with_space<R>(
        &self,
        space: &SpinLock<RootTable>,
        f: impl FnOnce(&AddressSpace<'_, IdentityMapper>, &mut PageFrameAllocator) -> R,
    ) -> R {
        let root = space.lock();
        let mut frames = self.frames.lock();
        let aspace = AddressSpace::from_root_page(&self.mapper, root.page);
        f(&aspace, &mut *frames)
    }

    /// Identity-map the kernel image, the managed region and the MMIO
    /// windows into the kernel address space. Returns the pages mapped.
    ///
    /// # Errors
    /// The first [`MapError`] encountered; earlier mappings stay in place.
    pub fn identity_map_kernel(&self, layout: &KernelImageLayout) -> Result<usize, MapError> {
        let managed = self.mapper.region();
        self.with_kernel_space(|aspace, frames| -> Result<usize, MapError> {
            let mut pages = 0;
            for (name, range, kind) in layout.sections() {
                if range.is_empty() {
                    continue;
                }
                let flags = match kind {
                    SectionKind::Code => PteFlags::RX,
                    SectionKind::ReadOnly => PteFlags::READ,
                    SectionKind::ReadWrite => PteFlags::RW,
                };
                let mapped = aspace.map_identity_range(frames, range.start(), range.end(), flags)?;
                info!("{name}: {range:?} {flags:?} ({mapped} pages)");
                pages += mapped;
            }

            let mapped =
                aspace.map_identity_range(frames, managed.start(), managed.end(), PteFlags::RW)?;
            info!("managed region: [{}, {}) ({mapped} pages)", managed.start(), managed.end());
            pages += mapped;

            for (name, base, len) in MMIO_WINDOWS {
                let start = PhysicalAddress::new(base);
                pages += aspace.map_identity_range(frames, start, start + len, PteFlags::RW)?;
                info!("{name}: {start} +{len:#x}");
            }
            Ok(pages)
        })
    }

    /// Dump frame and heap tables through `info!`.
    pub fn log_report(&self) {
        self.frames.lock().log_allocations();
        self.heap.lock().log_table();
    }
}

static KERNEL_MEMORY: SyncOnceCell<KernelMemory> = SyncOnceCell::new();
static INIT: SpinLock<()> = SpinLock::new(());

/// Initialize the process-wide kernel memory over `region`.
///
/// # Errors
/// [`KernelMemoryError::AlreadyInitialized`] on a second call; otherwise as
/// [`KernelMemory::new`].
pub fn init(region: RawRegion) -> Result<&'static KernelMemory, KernelMemoryError> {
    let _serialized = INIT.lock();
    if KERNEL_MEMORY.is_initialized() {
        return Err(KernelMemoryError::AlreadyInitialized);
    }
    let kmem = KernelMemory::new(region)?;
    KERNEL_MEMORY
        .set(kmem)
        .map_err(|_| KernelMemoryError::AlreadyInitialized)
}

/// The process-wide instance, if [`init`] has run.
#[inline]
pub fn get() -> Option<&'static KernelMemory> {
    KERNEL_MEMORY.get()
}

fn kmem() -> &'static KernelMemory {
    match get() {
        Some(kmem) => kmem,
        None => {
            fatal!("failed asserting that kernel memory is initialized: kmem::init has not run")
        }
    }
}

/// # Errors
/// See [`KernelMemory::alloc_pages`].
pub fn alloc_pages(n: usize) -> Result<PhysicalAddress, FrameAllocError> {
    kmem().alloc_pages(n)
}

/// # Errors
/// See [`KernelMemory::alloc_page`].
pub fn alloc_page() -> Result<PhysicalAddress, FrameAllocError> {
    kmem().alloc_page()
}

pub fn dealloc_pages(pa: PhysicalAddress) -> usize {
    kmem().dealloc_pages(pa)
}

/// # Errors
/// See [`KernelMemory::kmalloc`].
pub fn kmalloc(size: usize) -> Result<NonNull<u8>, HeapError> {
    kmem().kmalloc(size)
}

/// # Errors
/// See [`KernelMemory::kcalloc`].
pub fn kcalloc(n: usize, size: usize) -> Result<NonNull<u8>, HeapError> {
    kmem().kcalloc(n, size)
}

pub fn kfree(ptr: NonNull<u8>) {
    kmem().kfree(ptr);
}
