mod common;

use common::{FRAME, arena, seeded_rng};
use core::ptr::NonNull;
use kernel_alloc::heap::{BlockHeader, Heap};
use kernel_alloc::PageFrameAllocator;
use kernel_info::memory::KMEM_PAGES;
use rand::Rng;

fn fresh_heap() -> (PageFrameAllocator, Heap) {
    let mut frames = PageFrameAllocator::init(arena(KMEM_PAGES + 8)).expect("frames");
    let heap = Heap::init(&mut frames).expect("heap");
    (frames, heap)
}

fn layout(heap: &Heap) -> Vec<(usize, bool)> {
    heap.blocks().map(|b| (b.size, b.taken)).collect()
}

fn tiled_bytes(heap: &Heap) -> usize {
    heap.blocks().map(|b| b.size).sum()
}

#[test]
fn first_malloc_splits_the_heap() {
    let (_frames, mut heap) = fresh_heap();
    let total = KMEM_PAGES * FRAME;
    assert_eq!(heap.total_bytes(), total);

    let p = heap.malloc(40).expect("malloc");
    assert_eq!(p.as_ptr() as u64, heap.head().as_u64() + BlockHeader::SIZE as u64);
    assert_eq!(layout(&heap), [(48, true), (total - 48, false)]);
    heap.log_table();
}

#[test]
fn payloads_are_eight_byte_aligned() {
    let (_frames, mut heap) = fresh_heap();
    for size in [1, 3, 8, 13, 100] {
        let p = heap.malloc(size).expect("malloc");
        assert_eq!(p.as_ptr() as usize % 8, 0);
    }
    let sizes: Vec<_> = heap.blocks().map(|b| b.size).take(5).collect();
    assert_eq!(sizes, [16, 16, 16, 24, 112]);
}

#[test]
fn block_sizes_always_tile_the_heap() {
    let (_frames, mut heap) = fresh_heap();
    let total = heap.total_bytes();
    let mut rng = seeded_rng(0xDEAD_BEEF_CAFE_F00D);
    let mut live: Vec<NonNull<u8>> = Vec::new();

    for _ in 0..2_000 {
        if live.is_empty() || rng.gen_range(0..5) < 3 {
            if let Ok(p) = heap.malloc(1 + rng.gen_range(0..2_000)) {
                live.push(p);
            }
        } else {
            let p = live.swap_remove(rng.gen_range(0..live.len()));
            heap.free(p);
        }
        assert_eq!(tiled_bytes(&heap), total);
    }

    for p in live.drain(..) {
        heap.free(p);
    }
    assert_eq!(layout(&heap), [(total, false)]);
}

#[test]
fn freeing_before_a_free_tail_merges_two_blocks() {
    let (_frames, mut heap) = fresh_heap();
    let total = heap.total_bytes();
    let a = heap.malloc(64).expect("a");
    let b = heap.malloc(64).expect("b");

    heap.free(b);
    assert_eq!(layout(&heap), [(72, true), (total - 72, false)]);
    heap.free(a);
    assert_eq!(layout(&heap), [(total, false)]);
}

#[test]
fn three_adjacent_free_blocks_merge_in_one_pass() {
    let (_frames, mut heap) = fresh_heap();
    let total = heap.total_bytes();
    let a = heap.malloc(8).expect("a");
    let b = heap.malloc(16).expect("b");
    let c = heap.malloc(24).expect("c");
    let _fence = heap.malloc(8).expect("fence");

    heap.free(a);
    heap.free(c);
    assert_eq!(
        layout(&heap),
        [(16, false), (24, true), (32, false), (16, true), (total - 88, false)]
    );

    // Freeing the middle block leaves three free neighbours for one coalesce.
    heap.free(b);
    assert_eq!(layout(&heap), [(72, false), (16, true), (total - 88, false)]);
}

#[test]
fn coalesce_twice_equals_once() {
    let (_frames, mut heap) = fresh_heap();
    let ptrs: Vec<_> = (0..8).map(|i| heap.malloc(8 * (i + 1)).expect("malloc")).collect();
    for p in ptrs.iter().step_by(2) {
        heap.free(*p);
    }
    let once = layout(&heap);
    assert_eq!(heap.coalesce(), 0);
    assert_eq!(layout(&heap), once);
    assert_eq!(heap.coalesce(), 0);
    assert_eq!(layout(&heap), once);
}

#[test]
fn exhaustion_is_recoverable() {
    let (_frames, mut heap) = fresh_heap();
    let total = heap.total_bytes();
    let big = heap.malloc(total - BlockHeader::SIZE).expect("whole heap");
    assert!(heap.malloc(8).is_err());
    heap.free(big);
    assert!(heap.malloc(8).is_ok());
}
