//! # Kernel synchronization primitives
//!
//! The memory core runs with interrupts possibly re-entering an allocator,
//! so every shared structure sits behind a [`SpinLock`]. Process-wide
//! singletons are published once through a [`SyncOnceCell`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;
mod sync_once_cell;

pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
