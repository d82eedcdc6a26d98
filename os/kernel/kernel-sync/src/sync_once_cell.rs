use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    mem::MaybeUninit,
    sync::atomic::{AtomicU8, Ordering},
};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;

/// Write-once cell usable in a `static`.
///
/// ```
/// # use kernel_sync::SyncOnceCell;
/// static ROOT: SyncOnceCell<u64> = SyncOnceCell::new();
/// assert!(ROOT.get().is_none());
/// assert_eq!(ROOT.set(0x8000_0000), Ok(&0x8000_0000));
/// assert_eq!(ROOT.set(1), Err(1));
/// ```
pub struct SyncOnceCell<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Default for SyncOnceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncOnceCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    #[inline]
    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == READY {
            // SAFETY: READY is stored only after the value is written.
            Some(unsafe { self.get_unchecked() })
        } else {
            None
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    /// Stores `value` unless the cell is already taken; hands it back otherwise.
    pub fn set(&self, value: T) -> Result<&T, T> {
        if self.begin_write() {
            Ok(self.finish_write(value))
        } else {
            Err(value)
        }
    }

    /// Initializes at most once, waiting for a concurrent initializer.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        if let Some(v) = self.get() {
            return v;
        }
        if self.begin_write() {
            return self.finish_write(init());
        }
        while self.state.load(Ordering::Acquire) != READY {
            spin_loop();
        }
        // SAFETY: READY observed with acquire ordering.
        unsafe { self.get_unchecked() }
    }

    fn begin_write(&self) -> bool {
        self.state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn finish_write(&self, value: T) -> &T {
        // SAFETY: WRITING is held by exactly one caller.
        unsafe {
            (*self.value.get()).write(value);
        }
        self.state.store(READY, Ordering::Release);
        // SAFETY: written above.
        unsafe { self.get_unchecked() }
    }

    unsafe fn get_unchecked(&self) -> &T {
        unsafe { (*self.value.get()).assume_init_ref() }
    }
}

impl<T> Drop for SyncOnceCell<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == READY {
            // SAFETY: READY means initialized; `&mut self` means no readers.
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

// Safety: shared only after READY; initialization is single-writer.
unsafe impl<T: Sync + Send> Sync for SyncOnceCell<T> {}
unsafe impl<T: Send> Send for SyncOnceCell<T> {}
