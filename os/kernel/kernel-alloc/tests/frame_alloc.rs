mod common;

use common::{FRAME, arena, seeded_rng};
use kernel_alloc::{FrameAllocError, PageFrameAllocator};
use kernel_memory_addresses::PhysicalAddress;
use rand::Rng;

/// 65 frames of bytes: one goes to descriptors and alignment, 64 are usable.
fn sixty_four_frames() -> PageFrameAllocator {
    let alloc = PageFrameAllocator::init(arena(65)).expect("init");
    assert_eq!(alloc.frames(), 64);
    alloc
}

fn index_of(alloc: &PageFrameAllocator, pa: PhysicalAddress) -> usize {
    ((pa.as_u64() - alloc.alloc_start().as_u64()) as usize) / FRAME
}

#[test]
fn mixed_sizes_are_disjoint() {
    let mut alloc = sixty_four_frames();
    let sizes = [7, 1, 2, 9, 1];
    let starts: Vec<_> = sizes.iter().map(|&n| alloc.alloc(n).expect("alloc")).collect();

    let mut ranges: Vec<_> = starts
        .iter()
        .zip(sizes)
        .map(|(&pa, n)| (index_of(&alloc, pa), n))
        .collect();
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        assert!(pair[0].0 + pair[0].1 <= pair[1].0, "overlap in {ranges:?}");
    }

    let usage = alloc.usage();
    assert_eq!(usage.taken, 20);
    assert_eq!(usage.free, 44);
    let runs: Vec<_> = alloc.runs().map(|r| r.frames).collect();
    assert_eq!(runs, sizes);
}

#[test]
fn freed_pair_is_reused_first() {
    let mut alloc = sixty_four_frames();
    let _a = alloc.alloc(7).expect("a");
    let _b = alloc.alloc_one().expect("b");
    let pair = alloc.alloc(2).expect("pair");
    let _c = alloc.alloc(9).expect("c");
    let _d = alloc.alloc_one().expect("d");

    assert_eq!(alloc.dealloc(pair), 2);
    let x = alloc.alloc_one().expect("x");
    let y = alloc.alloc_one().expect("y");
    assert_eq!(x, pair);
    assert_eq!(y, pair + FRAME as u64);
    assert_eq!(alloc.usage().taken, 20);
}

#[test]
#[should_panic(expected = "possible double free")]
fn double_dealloc_is_detected() {
    let mut alloc = sixty_four_frames();
    let a = alloc.alloc(3).expect("a");
    alloc.dealloc(a);
    alloc.dealloc(a);
}

#[test]
fn oversized_requests_allocate_nothing() {
    let mut alloc = sixty_four_frames();
    let _ = alloc.alloc(60).expect("most");
    assert_eq!(
        alloc.alloc(5),
        Err(FrameAllocError::OutOfFrames { requested: 5, free: 4 })
    );
    assert_eq!(alloc.usage().taken, 60);
    assert_eq!(alloc.runs().count(), 1);
}

#[test]
fn fragmented_free_space_is_not_contiguous() {
    let mut alloc = sixty_four_frames();
    let blocks: Vec<_> = (0..32).map(|_| alloc.alloc(2).expect("pair")).collect();
    for pa in blocks.iter().step_by(2) {
        alloc.dealloc(*pa);
    }
    // 32 frames free, but only in runs of 2.
    assert_eq!(alloc.usage().free, 32);
    assert!(matches!(
        alloc.alloc(3),
        Err(FrameAllocError::OutOfFrames { requested: 3, free: 32 })
    ));
}

#[test]
fn allocations_are_zeroed() {
    let region = arena(65);
    let mut alloc = PageFrameAllocator::init(region).expect("init");
    for _ in 0..3 {
        let pa = alloc.alloc(5).expect("alloc");
        let bytes = unsafe { core::slice::from_raw_parts(pa.as_u64() as *const u8, 5 * FRAME) };
        assert!(bytes.iter().all(|b| *b == 0));
        // Dirty it before handing it back.
        unsafe { core::ptr::write_bytes(pa.as_u64() as *mut u8, 0xEE, 5 * FRAME) };
        alloc.dealloc(pa);
    }
}

#[test]
fn taken_frames_match_live_allocations() {
    let mut alloc = sixty_four_frames();
    let mut rng = seeded_rng(0x9E37_79B9_7F4A_7C15);
    let mut live: Vec<(PhysicalAddress, usize)> = Vec::new();

    for _ in 0..500 {
        if live.is_empty() || rng.gen_range(0..3) != 0 {
            let n = 1 + rng.gen_range(0..6);
            if let Ok(pa) = alloc.alloc(n) {
                live.push((pa, n));
            }
        } else {
            let (pa, n) = live.swap_remove(rng.gen_range(0..live.len()));
            assert_eq!(alloc.dealloc(pa), n);
        }

        let mut expected = vec![false; alloc.frames()];
        for &(pa, n) in &live {
            let first = index_of(&alloc, pa);
            for slot in &mut expected[first..first + n] {
                assert!(!*slot, "frame handed out twice");
                *slot = true;
            }
        }
        for (i, want) in expected.iter().enumerate() {
            assert_eq!(alloc.is_frame_taken(i), Some(*want), "frame {i}");
        }
    }
}
