//! # Page-Frame Allocator
//!
//! Manages a contiguous region as an array of 4 KiB frames.
//!
//! ```text
//! region.start()                                            region.end()
//! ┌──────────────┬─────────┬──────────┬──────────┬─────┬──────────┬─────┐
//! │ descriptors  │ padding │ frame 0  │ frame 1  │ ... │ frame N-1│ tail│
//! │ 1 byte/frame │         │          │          │     │          │     │
//! └──────────────┴─────────┴──────────┴──────────┴─────┴──────────┘─────┘
//!                          ▲ alloc_start (frame-aligned)
//! ```
//!
//! Each descriptor byte holds [`FrameFlags`]. A live allocation of `n`
//! frames has `TAKEN` on all of them and `LAST` on the final one only.
//! Allocation is a linear first-fit scan; no free lists.

use crate::fatal::{fatal, fatal_assert};
use crate::region::RawRegion;
use core::fmt;
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, align_up};
use kernel_vmem::FrameAlloc;
use log::{debug, info, warn};

bitflags::bitflags! {
    /// Page descriptor, one byte per frame at the region start.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct FrameFlags: u8 {
        const TAKEN = 1 << 0;
        /// Final frame of a multi-frame allocation.
        const LAST  = 1 << 1;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameAllocError {
    #[error("cannot allocate zero frames")]
    ZeroFrames,
    #[error("no run of {requested} free frames ({free} free in total)")]
    OutOfFrames { requested: usize, free: usize },
    #[error("region of {len} bytes cannot hold a single frame")]
    RegionTooSmall { len: usize },
}

/// Frame totals.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameUsage {
    pub total: usize,
    pub taken: usize,
    pub free: usize,
}

/// One live allocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameRun {
    pub start: PhysicalAddress,
    pub frames: usize,
}

impl FrameRun {
    #[must_use]
    pub fn end(&self) -> PhysicalAddress {
        self.start + (self.frames * PAGE_SIZE) as u64
    }
}

impl fmt::Display for FrameRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = if self.frames == 1 { "page" } else { "pages" };
        write!(f, "[{}, {}): {} {unit}", self.start, self.end(), self.frames)
    }
}

pub struct PageFrameAllocator {
    region: RawRegion,
    frames: usize,
    /// Offset of frame 0 within `region`.
    alloc_start: usize,
}

impl PageFrameAllocator {
    /// Format `region`: descriptors at its start, then as many frames as fit.
    ///
    /// # Errors
    /// [`FrameAllocError::RegionTooSmall`] if not even one frame fits after
    /// the descriptor array.
    pub fn init(region: RawRegion) -> Result<Self, FrameAllocError> {
        let len = region.len();
        let start = region.start().as_usize();
        let initial = len / PAGE_SIZE;
        if initial == 0 {
            return Err(FrameAllocError::RegionTooSmall { len });
        }

        region.fill(0, initial, 0);
        let alloc_start = align_up(start + initial, PAGE_SIZE) - start;

        // Drop however many frames would spill past the region end.
        let overrun = (alloc_start + initial * PAGE_SIZE).saturating_sub(len);
        let frames = initial.saturating_sub(overrun.div_ceil(PAGE_SIZE));
        if frames == 0 {
            return Err(FrameAllocError::RegionTooSmall { len });
        }
        fatal_assert!(
            alloc_start + frames * PAGE_SIZE <= len,
            "frame area ends inside region {}",
            region.start()
        );

        let this = Self {
            region,
            frames,
            alloc_start,
        };
        info!(
            "frame allocator: {frames} frames ({} KiB) at {}, descriptors at {}",
            frames * PAGE_SIZE / 1024,
            this.alloc_start(),
            region.start()
        );
        Ok(this)
    }

    #[inline]
    fn flags(&self, index: usize) -> FrameFlags {
        FrameFlags::from_bits_retain(self.region.read_u8(index))
    }

    #[inline]
    fn set_flags(&self, index: usize, flags: FrameFlags) {
        self.region.write_u8(index, flags.bits());
    }

    #[inline]
    fn frame_addr(&self, index: usize) -> PhysicalAddress {
        self.region.addr_at(self.alloc_start + index * PAGE_SIZE)
    }

    /// Allocate `n` consecutive zeroed frames; returns the first one's address.
    ///
    /// # Errors
    /// - [`FrameAllocError::ZeroFrames`] for `n == 0`.
    /// - [`FrameAllocError::OutOfFrames`] if no free run of `n` frames exists.
    ///   Nothing is marked in that case.
    pub fn alloc(&mut self, n: usize) -> Result<PhysicalAddress, FrameAllocError> {
        if n == 0 {
            return Err(FrameAllocError::ZeroFrames);
        }

        let mut i = 0;
        'scan: while i + n <= self.frames {
            for j in 0..n {
                if self.flags(i + j).contains(FrameFlags::TAKEN) {
                    i += j + 1;
                    continue 'scan;
                }
            }

            for j in 0..n - 1 {
                self.set_flags(i + j, FrameFlags::TAKEN);
            }
            self.set_flags(i + n - 1, FrameFlags::TAKEN | FrameFlags::LAST);
            self.region.fill(self.alloc_start + i * PAGE_SIZE, n * PAGE_SIZE, 0);

            let pa = self.frame_addr(i);
            debug!("alloc {n} frame(s) at {pa}");
            return Ok(pa);
        }

        let free = self.usage().free;
        warn!("out of frames: requested {n}, {free} free");
        Err(FrameAllocError::OutOfFrames { requested: n, free })
    }

    /// Allocate a single zeroed frame.
    ///
    /// # Errors
    /// As [`alloc`](Self::alloc).
    #[inline]
    pub fn alloc_one(&mut self) -> Result<PhysicalAddress, FrameAllocError> {
        self.alloc(1)
    }

    /// Release the allocation starting at `pa`; returns its frame count.
    ///
    /// Halts on a pointer outside the frame area, a pointer that is not a
    /// frame start, or a descriptor run that does not end in `LAST` (typical
    /// of a double free).
    #[allow(clippy::cast_possible_truncation)]
    pub fn dealloc(&mut self, pa: PhysicalAddress) -> usize {
        fatal_assert!(
            self.alloc_start() <= pa && pa < self.alloc_end(),
            "{pa} lies in frame area [{}, {})",
            self.alloc_start(),
            self.alloc_end()
        );
        let offset = (pa.as_u64() - self.alloc_start().as_u64()) as usize;
        fatal_assert!(offset % PAGE_SIZE == 0, "{pa} is frame-aligned");

        let first = offset / PAGE_SIZE;
        let mut index = first;
        loop {
            let flags = self.flags(index);
            fatal_assert!(
                flags.contains(FrameFlags::TAKEN),
                "frame {index} is taken while freeing {pa} (possible double free)"
            );
            self.set_flags(index, FrameFlags::empty());
            if flags.contains(FrameFlags::LAST) {
                break;
            }
            index += 1;
            if index == self.frames {
                fatal!(
                    "failed asserting that descriptors end in LAST: ran off the end freeing {pa}"
                );
            }
        }

        let freed = index - first + 1;
        debug!("dealloc {freed} frame(s) at {pa}");
        freed
    }

    /// Number of usable frames.
    #[inline]
    #[must_use]
    pub const fn frames(&self) -> usize {
        self.frames
    }

    /// The whole managed region, descriptors included.
    #[inline]
    #[must_use]
    pub const fn region(&self) -> RawRegion {
        self.region
    }

    /// Address of frame 0.
    #[inline]
    #[must_use]
    pub fn alloc_start(&self) -> PhysicalAddress {
        self.frame_addr(0)
    }

    /// One past the last frame.
    #[inline]
    #[must_use]
    pub fn alloc_end(&self) -> PhysicalAddress {
        self.frame_addr(self.frames)
    }

    /// `[start, end)` of the descriptor array.
    #[must_use]
    pub fn descriptors(&self) -> (PhysicalAddress, PhysicalAddress) {
        (self.region.start(), self.region.addr_at(self.frames))
    }

    /// `None` for an index past the last frame.
    #[must_use]
    pub fn is_frame_taken(&self, index: usize) -> Option<bool> {
        (index < self.frames).then(|| self.flags(index).contains(FrameFlags::TAKEN))
    }

    #[must_use]
    pub fn usage(&self) -> FrameUsage {
        let taken = (0..self.frames)
            .filter(|&i| self.flags(i).contains(FrameFlags::TAKEN))
            .count();
        FrameUsage {
            total: self.frames,
            taken,
            free: self.frames - taken,
        }
    }

    /// Live allocations in address order.
    pub fn runs(&self) -> impl Iterator<Item = FrameRun> + '_ {
        Runs {
            alloc: self,
            next: 0,
        }
    }

    /// Dump the allocation table through `info!`.
    pub fn log_allocations(&self) {
        let (meta_start, meta_end) = self.descriptors();
        info!("PAGE ALLOCATION TABLE");
        info!("usable: {} pages ({} bytes)", self.frames, self.frames * PAGE_SIZE);
        info!("metadata: [{meta_start}, {meta_end})");
        info!("pages: [{}, {})", self.alloc_start(), self.alloc_end());
        for run in self.runs() {
            info!("{run}");
        }
        let usage = self.usage();
        info!(
            "allocated: {} pages ({} bytes), free: {} pages",
            usage.taken,
            usage.taken * PAGE_SIZE,
            usage.free
        );
    }
}

struct Runs<'a> {
    alloc: &'a PageFrameAllocator,
    next: usize,
}

impl Iterator for Runs<'_> {
    type Item = FrameRun;

    fn next(&mut self) -> Option<FrameRun> {
        let a = self.alloc;
        while self.next < a.frames && !a.flags(self.next).contains(FrameFlags::TAKEN) {
            self.next += 1;
        }
        if self.next >= a.frames {
            return None;
        }

        let first = self.next;
        loop {
            let flags = a.flags(self.next);
            fatal_assert!(
                flags.contains(FrameFlags::TAKEN),
                "run at frame {first} is contiguous up to its LAST frame"
            );
            self.next += 1;
            if flags.contains(FrameFlags::LAST) {
                break;
            }
            fatal_assert!(self.next < a.frames, "run at frame {first} ends in LAST");
        }

        Some(FrameRun {
            start: a.frame_addr(first),
            frames: self.next - first,
        })
    }
}

impl FrameAlloc for PageFrameAllocator {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.alloc_one().ok().and_then(PhysicalPage::from_start)
    }

    fn free_4k(&mut self, page: PhysicalPage<Size4K>) {
        self.dealloc(page.base());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Arena;

    #[test]
    fn descriptors_fit_before_the_frames() {
        let arena = Arena::frames(65);
        let alloc = PageFrameAllocator::init(arena.region()).expect("init");
        assert_eq!(alloc.frames(), 64);
        assert_eq!(alloc.alloc_start(), arena.region().start() + PAGE_SIZE as u64);
        assert_eq!(alloc.alloc_end(), arena.region().end());
        assert_eq!(alloc.usage().free, 64);
    }

    #[test]
    fn unaligned_region_shrinks() {
        let arena = Arena::frames(8);
        // 100 bytes in: descriptors at +100, frame 0 at the next boundary.
        let region = arena.region().subregion(100, 7 * PAGE_SIZE);
        let alloc = PageFrameAllocator::init(region).expect("init");
        assert_eq!(alloc.alloc_start(), arena.region().start() + PAGE_SIZE as u64);
        assert_eq!(alloc.frames(), 6);
        assert!(alloc.alloc_end() <= region.end());
    }

    #[test]
    fn tiny_regions_are_rejected() {
        let arena = Arena::frames(1);
        assert_eq!(
            PageFrameAllocator::init(arena.region().subregion(0, 4095)).err(),
            Some(FrameAllocError::RegionTooSmall { len: 4095 })
        );
        // One frame of bytes leaves no room after its descriptor.
        assert_eq!(
            PageFrameAllocator::init(arena.region()).err(),
            Some(FrameAllocError::RegionTooSmall { len: PAGE_SIZE })
        );
    }

    #[test]
    fn zero_frames_is_an_error() {
        let arena = Arena::frames(4);
        let mut alloc = PageFrameAllocator::init(arena.region()).expect("init");
        assert_eq!(alloc.alloc(0), Err(FrameAllocError::ZeroFrames));
    }

    #[test]
    fn first_fit_skips_taken_runs() {
        let arena = Arena::frames(9);
        let mut alloc = PageFrameAllocator::init(arena.region()).expect("init");
        let a = alloc.alloc(2).expect("a");
        let b = alloc.alloc(1).expect("b");
        alloc.dealloc(a);
        // Three frames do not fit the two-frame hole before `b`.
        let c = alloc.alloc(3).expect("c");
        assert_eq!(c, b + PAGE_SIZE as u64);
        // One frame does.
        assert_eq!(alloc.alloc_one().expect("d"), a);
    }

    #[test]
    fn runs_report_live_allocations() {
        let arena = Arena::frames(9);
        let mut alloc = PageFrameAllocator::init(arena.region()).expect("init");
        let a = alloc.alloc(3).expect("a");
        let b = alloc.alloc(1).expect("b");
        let runs: Vec<_> = alloc.runs().collect();
        assert_eq!(
            runs,
            [FrameRun { start: a, frames: 3 }, FrameRun { start: b, frames: 1 }]
        );
        assert_eq!(runs[0].to_string(), format!("[{a}, {b}): 3 pages"));
        alloc.log_allocations();
    }

    #[test]
    fn frame_alloc_trait_hands_out_pages() {
        let arena = Arena::frames(4);
        let mut alloc = PageFrameAllocator::init(arena.region()).expect("init");
        let page = alloc.alloc_4k().expect("page");
        assert_eq!(alloc.is_frame_taken(0), Some(true));
        alloc.free_4k(page);
        assert_eq!(alloc.is_frame_taken(0), Some(false));
        assert_eq!(alloc.is_frame_taken(alloc.frames()), None);
    }

    #[test]
    #[should_panic(expected = "is frame-aligned")]
    fn interior_pointer_is_fatal() {
        let arena = Arena::frames(4);
        let mut alloc = PageFrameAllocator::init(arena.region()).expect("init");
        let a = alloc.alloc(2).expect("a");
        alloc.dealloc(a + 8);
    }

    #[test]
    #[should_panic(expected = "lies in frame area")]
    fn foreign_pointer_is_fatal() {
        let arena = Arena::frames(4);
        let mut alloc = PageFrameAllocator::init(arena.region()).expect("init");
        alloc.dealloc(arena.region().start());
    }

    #[test]
    #[should_panic(expected = "ran off the end")]
    fn run_without_last_at_the_end_is_fatal() {
        let arena = Arena::frames(5);
        let mut alloc = PageFrameAllocator::init(arena.region()).expect("init");
        let a = alloc.alloc(4).expect("all frames");
        // Corrupt the final descriptor so the run never terminates.
        alloc.set_flags(3, FrameFlags::TAKEN);
        alloc.dealloc(a);
    }
}
