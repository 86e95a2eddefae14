//! Per-CPU magazine: a single cached page plus the head of its own in-page
//! freelist. Ownership is single-writer — the caller-supplied logical CPU
//! id is the allocator's only synchronization here, the way the "slow"
//! magazine is the only one of these that needs a spinlock (CPU-less
//! callers share it).
//!
//! `MagazineCell` wraps the mutable `Magazine` in an `UnsafeCell` and
//! asserts `Sync` by hand, the same pattern `other` per-CPU cache
//! implementations in the wild use for a `[Cell; NR_CPUS]`-style array that
//! otherwise couldn't be shared across threads at all: the compiler can't
//! see that access is partitioned by CPU id, so we tell it.

use std::cell::UnsafeCell;
use std::ptr;

use crate::backbone::page::PageRecord;

pub struct Magazine {
    /// The page currently cached here, or null if the magazine is empty.
    pub page: *mut PageRecord,
    /// Head of the magazine-local in-page freelist, or 0 if exhausted
    /// (though the page is then due for a refill, not further use).
    pub freelist: usize,
}

impl Magazine {
    const fn empty() -> Self {
        Magazine {
            page: ptr::null_mut(),
            freelist: 0,
        }
    }

    pub fn has_page(&self) -> bool {
        !self.page.is_null()
    }
}

pub struct MagazineCell(UnsafeCell<Magazine>);

impl MagazineCell {
    pub const fn new() -> Self {
        MagazineCell(UnsafeCell::new(Magazine::empty()))
    }

    /// # Safety
    /// The caller must be the exclusive user of this magazine slot for the
    /// duration of the borrow: either the thread pinned to the
    /// corresponding logical CPU id, or a holder of the slow magazine's
    /// spinlock.
    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get(&self) -> &mut Magazine {
        &mut *self.0.get()
    }
}

// Safety is the caller's responsibility through `get`'s contract, same as
// any per-CPU-cache cell type.
unsafe impl Sync for MagazineCell {}

impl Default for MagazineCell {
    fn default() -> Self {
        MagazineCell::new()
    }
}
