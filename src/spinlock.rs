//! A single-word spinlock, ported from the reference architecture's
//! `nosv_spinlock_t` (`generic/spinlock.h`): an uncontended `compare_exchange`
//! fast path, and a contended path that spins on a relaxed load before
//! retrying the CAS so waiters don't hammer the cache line with RMWs.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::arch;

#[derive(Debug, Default)]
pub struct Spinlock {
    locked: AtomicBool,
}

impl Spinlock {
    pub const fn new() -> Self {
        Spinlock {
            locked: AtomicBool::new(false),
        }
    }

    pub fn lock(&self) {
        if self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return;
        }
        loop {
            while self.locked.load(Ordering::Relaxed) {
                arch::spin_hint();
            }
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
        arch::spin_hint_release();
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Run `f` while holding the lock, releasing it even if `f` panics.
    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        self.lock();
        let _guard = SpinlockGuard { lock: self };
        f()
    }
}

struct SpinlockGuard<'a> {
    lock: &'a Spinlock,
}

impl Drop for SpinlockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn excludes_concurrent_increments() {
        let lock = Arc::new(Spinlock::new());
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        lock.with_lock(|| {
                            counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        });
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 80_000);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock = Spinlock::new();
        lock.lock();
        assert!(!lock.try_lock());
        lock.unlock();
        assert!(lock.try_lock());
    }
}
