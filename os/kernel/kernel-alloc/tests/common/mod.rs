#![allow(dead_code)]

use core::ptr::NonNull;
use kernel_alloc::RawRegion;
use rand::SeedableRng;
use rand::rngs::SmallRng;

pub const FRAME: usize = 4096;

#[repr(C, align(4096))]
struct Frame([u8; FRAME]);

/// Leaks `n` page-aligned host frames filled with a non-zero pattern.
pub fn arena(n: usize) -> RawRegion {
    let frames: Vec<Frame> = (0..n).map(|_| Frame([0xC3; FRAME])).collect();
    let frames = Box::leak(frames.into_boxed_slice());
    let base = NonNull::new(frames.as_mut_ptr().cast::<u8>()).expect("non-null");
    unsafe { RawRegion::from_raw_parts(base, n * FRAME) }
}

/// Seeded generator so property-style runs are reproducible.
pub fn seeded_rng(seed: u64) -> SmallRng {
    SmallRng::seed_from_u64(seed)
}
