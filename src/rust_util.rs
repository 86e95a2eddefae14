//! Small language-gap fillers, adapted from `mmtk-core`'s `util/rust_util/mod.rs`.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::Once;

/// A value that is uninitialized until `initialize_once` is called, after
/// which reads are a single load with no further checks — unlike a
/// check-every-read `OnceLock`. Used for the process-wide singleton behind
/// the free-function embedding-contract facade in `lib.rs`.
pub struct InitializeOnce<T: 'static> {
    v: UnsafeCell<MaybeUninit<T>>,
    once: Once,
}

impl<T> InitializeOnce<T> {
    pub const fn new() -> Self {
        InitializeOnce {
            v: UnsafeCell::new(MaybeUninit::uninit()),
            once: Once::new(),
        }
    }

    /// Initialize the value. If called concurrently, the first caller's
    /// closure runs and the rest block until it's done.
    pub fn initialize_once(&self, init_fn: impl FnOnce() -> T) {
        // `Once::call_once` requires `FnOnce`, but only accepts it by value
        // through a `Fn`-like callback once; we route through an `Option`
        // so we can move the closure in.
        let mut slot = Some(init_fn);
        self.once.call_once(|| {
            let f = slot.take().unwrap();
            unsafe { &mut *self.v.get() }.write(f());
        });
        debug_assert!(self.once.is_completed());
    }

    pub fn is_initialized(&self) -> bool {
        self.once.is_completed()
    }

    /// # Panics
    /// Panics in debug builds if called before `initialize_once`.
    pub fn get_ref(&self) -> &T {
        debug_assert!(self.once.is_completed(), "InitializeOnce read before init");
        unsafe { (*self.v.get()).assume_init_ref() }
    }

    pub fn try_get_ref(&self) -> Option<&T> {
        if self.once.is_completed() {
            Some(unsafe { (*self.v.get()).assume_init_ref() })
        } else {
            None
        }
    }
}

unsafe impl<T> Sync for InitializeOnce<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn initializes_exactly_once_under_contention() {
        static VALUE: InitializeOnce<usize> = InitializeOnce::new();
        static COUNT: AtomicUsize = AtomicUsize::new(0);

        let threads: Vec<_> = (0..32)
            .map(|_| {
                std::thread::spawn(|| {
                    VALUE.initialize_once(|| {
                        COUNT.fetch_add(1, Ordering::SeqCst);
                        7usize
                    });
                    assert_eq!(*VALUE.get_ref(), 7);
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(COUNT.load(Ordering::SeqCst), 1);
    }
}
