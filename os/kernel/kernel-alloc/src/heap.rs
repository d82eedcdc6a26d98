//! # Byte-Grained Kernel Heap
//!
//! A fixed run of frames carved into variable-size blocks. Every block starts
//! with an 8-byte [`BlockHeader`]; the payload follows immediately.
//!
//! ```text
//! head                                                         head + total
//! ┌────┬──────────────┬────┬────────────────────┬────┬──────────────────┐
//! │ hdr│ payload      │ hdr│ payload            │ hdr│ free             │
//! │ T  │              │ F  │                    │ T  │                  │
//! └────┴──────────────┴────┴────────────────────┴────┴──────────────────┘
//! ```
//!
//! Block sizes include the header and always tile the heap exactly.
//! `malloc` is first-fit from the head; `free` marks the block free and
//! merges neighbours.

use crate::fatal::{fatal, fatal_assert};
use crate::frame_alloc::{FrameAllocError, PageFrameAllocator};
use crate::region::RawRegion;
use bitfield_struct::bitfield;
use core::ptr::NonNull;
use kernel_info::memory::{HEAP_ALIGN, KMEM_PAGES, PAGE_SIZE};
use kernel_memory_addresses::PhysicalAddress;
use log::{debug, info, warn};

/// In-band block header.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct BlockHeader {
    /// Block size in bytes, header included.
    #[bits(63)]
    pub size: u64,
    pub taken: bool,
}

impl BlockHeader {
    /// Bytes occupied by the header in front of each payload.
    pub const SIZE: usize = size_of::<u64>();

    #[inline]
    #[must_use]
    pub const fn new_free(size: usize) -> Self {
        Self::new().with_size(size as u64)
    }

    #[inline]
    #[must_use]
    pub const fn new_taken(size: usize) -> Self {
        Self::new().with_size(size as u64).with_taken(true)
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn block_size(self) -> usize {
        self.size() as usize
    }

    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        !self.taken()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
    #[error("zero-sized heap allocation")]
    ZeroSize,
    #[error("requested heap size overflows")]
    SizeOverflow,
    #[error("no free heap block for {requested} bytes")]
    OutOfMemory { requested: usize },
    #[error(transparent)]
    Frames(#[from] FrameAllocError),
}

/// One block as seen by a heap walk.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HeapBlock {
    /// Header address.
    pub addr: PhysicalAddress,
    /// Size including the header.
    pub size: usize,
    pub taken: bool,
}

pub struct Heap {
    region: RawRegion,
    pages: usize,
    root_table: PhysicalAddress,
}

#[inline]
const fn round_to_align(size: usize) -> Option<usize> {
    match size.checked_add(HEAP_ALIGN - 1) {
        Some(s) => Some(s & !(HEAP_ALIGN - 1)),
        None => None,
    }
}

impl Heap {
    /// Reserve [`KMEM_PAGES`] frames for the heap plus one frame for the
    /// default address space's root table, and format the heap as a single
    /// free block.
    ///
    /// # Errors
    /// [`HeapError::Frames`] if either reservation fails; nothing stays
    /// allocated in that case.
    pub fn init(frames: &mut PageFrameAllocator) -> Result<Self, HeapError> {
        Self::with_pages(frames, KMEM_PAGES)
    }

    /// As [`init`](Self::init) with a custom heap size in frames.
    ///
    /// # Errors
    /// As [`init`](Self::init).
    pub fn with_pages(frames: &mut PageFrameAllocator, pages: usize) -> Result<Self, HeapError> {
        let head = frames.alloc(pages)?;
        let root_table = match frames.alloc_one() {
            Ok(root) => root,
            Err(e) => {
                frames.dealloc(head);
                return Err(e.into());
            }
        };

        let managed = frames.region();
        let Some(offset) = managed.offset_of(head) else {
            fatal!("failed asserting that heap lies in managed region: {head}");
        };
        let region = managed.subregion(offset, pages * PAGE_SIZE);
        region.write_u64(0, BlockHeader::new_free(region.len()).into_bits());

        info!(
            "heap: {pages} pages ({} bytes) at {head}, root table at {root_table}",
            region.len()
        );
        Ok(Self {
            region,
            pages,
            root_table,
        })
    }

    #[inline]
    fn header(&self, offset: usize) -> BlockHeader {
        BlockHeader::from_bits(self.region.read_u64(offset))
    }

    #[inline]
    fn set_header(&self, offset: usize, header: BlockHeader) {
        self.region.write_u64(offset, header.into_bits());
    }

    /// Header at `offset`, halting on a size that cannot be part of a tiling.
    fn checked_header(&self, offset: usize) -> BlockHeader {
        let header = self.header(offset);
        let size = header.block_size();
        fatal_assert!(
            size != 0,
            "heap block at {} has a size (possible double free)",
            self.region.addr_at(offset)
        );
        fatal_assert!(
            size <= self.region.len() - offset,
            "heap block at {} of {size} bytes ends inside the heap",
            self.region.addr_at(offset)
        );
        header
    }

    /// Allocate at least `size` bytes, 8-byte aligned.
    ///
    /// # Errors
    /// - [`HeapError::ZeroSize`] for `size == 0`.
    /// - [`HeapError::SizeOverflow`] if the rounded size overflows.
    /// - [`HeapError::OutOfMemory`] if no free block is large enough.
    pub fn malloc(&mut self, size: usize) -> Result<NonNull<u8>, HeapError> {
        if size == 0 {
            return Err(HeapError::ZeroSize);
        }
        let needed = round_to_align(size)
            .and_then(|s| s.checked_add(BlockHeader::SIZE))
            .ok_or(HeapError::SizeOverflow)?;

        let mut offset = 0;
        while offset < self.region.len() {
            let header = self.checked_header(offset);
            let block = header.block_size();
            if header.is_free() && needed <= block {
                let remaining = block - needed;
                if remaining > BlockHeader::SIZE {
                    self.set_header(offset, BlockHeader::new_taken(needed));
                    self.set_header(offset + needed, BlockHeader::new_free(remaining));
                } else {
                    self.set_header(offset, BlockHeader::new_taken(block));
                }
                let ptr = self.region.ptr_at(offset + BlockHeader::SIZE);
                debug!("kmalloc({size}) = {:p}", ptr);
                return Ok(ptr);
            }
            offset += block;
        }

        warn!("heap exhausted: no block for {size} bytes");
        Err(HeapError::OutOfMemory { requested: size })
    }

    /// Allocate `n * size` bytes (rounded to 8) and zero all of them.
    ///
    /// # Errors
    /// As [`malloc`](Self::malloc); [`HeapError::SizeOverflow`] also when
    /// `n * size` overflows.
    pub fn calloc(&mut self, n: usize, size: usize) -> Result<NonNull<u8>, HeapError> {
        let total = n
            .checked_mul(size)
            .and_then(round_to_align)
            .ok_or(HeapError::SizeOverflow)?;
        let ptr = self.malloc(total)?;
        self.region.fill(self.payload_offset(ptr), total, 0);
        Ok(ptr)
    }

    fn payload_offset(&self, ptr: NonNull<u8>) -> usize {
        let addr = PhysicalAddress::from_nonnull(ptr);
        let Some(offset) = self.region.offset_of(addr) else {
            fatal!(
                "failed asserting that {addr} lies in heap [{}, {})",
                self.region.start(),
                self.region.end()
            );
        };
        offset
    }

    /// Release the block whose payload starts at `ptr`, then merge free
    /// neighbours.
    ///
    /// A pointer that is not the payload of any block halts. Freeing an
    /// already free block only warns.
    pub fn free(&mut self, ptr: NonNull<u8>) {
        let offset = self.payload_offset(ptr);
        fatal_assert!(
            offset >= BlockHeader::SIZE,
            "{ptr:p} is preceded by a block header"
        );
        let header_offset = offset - BlockHeader::SIZE;
        let is_boundary = self
            .block_offsets()
            .take_while(|&o| o <= header_offset)
            .any(|o| o == header_offset);
        fatal_assert!(is_boundary, "{ptr:p} is the payload of a heap block");

        let header = self.header(header_offset);
        if header.taken() {
            self.set_header(header_offset, header.with_taken(false));
            debug!("kfree({ptr:p}): {} bytes", header.block_size());
        } else {
            warn!("kfree({ptr:p}): block already free");
        }
        self.coalesce();
    }

    /// Merge every run of physically adjacent free blocks into one block.
    ///
    /// A single call fully collapses runs of any length: after a merge the
    /// scan stays on the grown block. Returns the number of merges.
    pub fn coalesce(&mut self) -> usize {
        let len = self.region.len();
        let mut merges = 0;
        let mut offset = 0;
        while offset < len {
            let head = self.checked_header(offset);
            let next_offset = offset + head.block_size();
            if next_offset >= len {
                break;
            }
            let next = self.checked_header(next_offset);
            if head.is_free() && next.is_free() {
                let merged = head.block_size() + next.block_size();
                self.set_header(offset, BlockHeader::new_free(merged));
                merges += 1;
            } else {
                offset = next_offset;
            }
        }
        if merges > 0 {
            debug!("coalesced {merges} block(s)");
        }
        merges
    }

    fn block_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        let mut offset = 0;
        core::iter::from_fn(move || {
            if offset >= self.region.len() {
                return None;
            }
            let current = offset;
            offset += self.checked_header(current).block_size();
            Some(current)
        })
    }

    /// Every block in heap order.
    pub fn blocks(&self) -> impl Iterator<Item = HeapBlock> + '_ {
        self.block_offsets().map(|offset| {
            let header = self.header(offset);
            HeapBlock {
                addr: self.region.addr_at(offset),
                size: header.block_size(),
                taken: header.taken(),
            }
        })
    }

    /// Address of the first block header.
    #[inline]
    #[must_use]
    pub fn head(&self) -> PhysicalAddress {
        self.region.start()
    }

    /// Frames backing the heap.
    #[inline]
    #[must_use]
    pub const fn reserved_pages(&self) -> usize {
        self.pages
    }

    #[inline]
    #[must_use]
    pub const fn total_bytes(&self) -> usize {
        self.region.len()
    }

    /// Frame reserved for the default address space's root table.
    #[inline]
    #[must_use]
    pub const fn root_table(&self) -> PhysicalAddress {
        self.root_table
    }

    /// Dump every block through `info!`.
    pub fn log_table(&self) {
        info!("KMEM ALLOCATION TABLE");
        for block in self.blocks() {
            info!(
                "{}: size = {}, taken = {}",
                block.addr,
                block.size,
                u8::from(block.taken)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Arena;

    fn heap_with(arena: &Arena, pages: usize) -> (PageFrameAllocator, Heap) {
        let mut frames = PageFrameAllocator::init(arena.region()).expect("frames");
        let heap = Heap::with_pages(&mut frames, pages).expect("heap");
        (frames, heap)
    }

    fn layout(heap: &Heap) -> Vec<(usize, bool)> {
        heap.blocks().map(|b| (b.size, b.taken)).collect()
    }

    #[test]
    fn header_bit_layout() {
        let h = BlockHeader::new_taken(48);
        assert_eq!(h.into_bits(), (1 << 63) | 48);
        assert_eq!(BlockHeader::from_bits(0x1000).block_size(), 0x1000);
        assert!(BlockHeader::from_bits(0x1000).is_free());
    }

    #[test]
    fn init_reserves_heap_and_root() {
        let arena = Arena::frames(8);
        let (frames, heap) = heap_with(&arena, 4);
        assert_eq!(heap.reserved_pages(), 4);
        assert_eq!(heap.total_bytes(), 4 * PAGE_SIZE);
        assert_eq!(heap.root_table(), heap.head() + (4 * PAGE_SIZE) as u64);
        assert_eq!(frames.usage().taken, 5);
        assert_eq!(layout(&heap), [(4 * PAGE_SIZE, false)]);
    }

    #[test]
    fn failed_root_reservation_releases_the_heap() {
        let arena = Arena::frames(4);
        let mut frames = PageFrameAllocator::init(arena.region()).expect("frames");
        assert_eq!(frames.frames(), 3);
        assert!(matches!(
            Heap::with_pages(&mut frames, 3),
            Err(HeapError::Frames(FrameAllocError::OutOfFrames { requested: 1, free: 0 }))
        ));
        assert_eq!(frames.usage().taken, 0);
    }

    #[test]
    fn small_remainder_stays_in_the_block() {
        let arena = Arena::frames(3);
        let (_frames, mut heap) = heap_with(&arena, 1);
        // Leave exactly 8 bytes: too small for a header plus payload.
        let _ = heap.malloc(PAGE_SIZE - 16).expect("big");
        assert_eq!(layout(&heap), [(PAGE_SIZE, true)]);
    }

    #[test]
    fn zero_and_overflowing_sizes() {
        let arena = Arena::frames(3);
        let (_frames, mut heap) = heap_with(&arena, 1);
        assert_eq!(heap.malloc(0), Err(HeapError::ZeroSize));
        assert_eq!(heap.malloc(usize::MAX), Err(HeapError::SizeOverflow));
        assert_eq!(heap.calloc(usize::MAX, 2), Err(HeapError::SizeOverflow));
        assert_eq!(
            heap.malloc(PAGE_SIZE),
            Err(HeapError::OutOfMemory { requested: PAGE_SIZE })
        );
    }

    #[test]
    fn calloc_zeroes_reused_memory() {
        let arena = Arena::frames(3);
        let (_frames, mut heap) = heap_with(&arena, 1);
        let p = heap.malloc(64).expect("p");
        unsafe { p.write_bytes(0xAB, 64) };
        heap.free(p);

        let q = heap.calloc(8, 7).expect("q");
        assert_eq!(q, p);
        let bytes = unsafe { core::slice::from_raw_parts(q.as_ptr(), 56) };
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn double_free_only_warns() {
        let arena = Arena::frames(3);
        let (_frames, mut heap) = heap_with(&arena, 1);
        let p = heap.malloc(16).expect("p");
        heap.free(p);
        heap.free(p);
        assert_eq!(layout(&heap), [(PAGE_SIZE, false)]);
    }

    #[test]
    #[should_panic(expected = "is the payload of a heap block")]
    fn interior_pointer_is_fatal() {
        let arena = Arena::frames(3);
        let (_frames, mut heap) = heap_with(&arena, 1);
        let p = heap.malloc(32).expect("p");
        heap.free(unsafe { p.add(8) });
    }

    #[test]
    #[should_panic(expected = "lies in heap")]
    fn pointer_outside_the_heap_is_fatal() {
        let arena = Arena::frames(3);
        let (frames, mut heap) = heap_with(&arena, 1);
        // The descriptor bytes sit below the heap's first frame.
        heap.free(frames.region().ptr_at(0));
    }

    #[test]
    #[should_panic(expected = "has a size")]
    fn zero_sized_block_is_fatal() {
        let arena = Arena::frames(3);
        let (_frames, mut heap) = heap_with(&arena, 1);
        let p = heap.malloc(32).expect("p");
        // Corrupt the trailing free block's header.
        heap.region.write_u64(40, 0);
        heap.free(p);
    }
}
