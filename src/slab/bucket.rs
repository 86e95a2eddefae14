//! One size-class bucket: object size, a spinlock guarding its `partial`
//! and `free` page lists, an array of per-CPU magazines, and the shared
//! "slow" magazine for CPU-less callers. Ported from the reference
//! `cpubucket_t`/bucket-level state in `memory/slab.c`.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::constants::NR_CPUS;
use crate::list::PageList;
use crate::slab::magazine::MagazineCell;
use crate::spinlock::Spinlock;

#[repr(C)]
pub struct BucketHeader {
    obj_size: AtomicUsize,
    pub lock: Spinlock,
    pub partial: PageList,
    pub free: PageList,
    magazines: [MagazineCell; NR_CPUS],
    pub slow: MagazineCell,
    pub slow_lock: Spinlock,
}

impl BucketHeader {
    pub fn new() -> Self {
        BucketHeader {
            obj_size: AtomicUsize::new(0),
            lock: Spinlock::new(),
            partial: PageList::new(),
            free: PageList::new(),
            magazines: std::array::from_fn(|_| MagazineCell::new()),
            slow: MagazineCell::new(),
            slow_lock: Spinlock::new(),
        }
    }

    pub fn set_obj_size(&self, obj_size: usize) {
        self.obj_size.store(obj_size, Ordering::Relaxed);
    }

    pub fn obj_size(&self) -> usize {
        self.obj_size.load(Ordering::Relaxed)
    }

    /// Objects that fit in one page of this bucket's class.
    pub fn objects_per_page(&self, page_size: usize) -> usize {
        page_size / self.obj_size()
    }

    /// `cpu < 0` maps to the slow magazine; otherwise `cpu` must be a valid
    /// logical CPU id. An out-of-range `cpu` is a caller bug, not a value to
    /// wrap into range — wrapping would alias two CPUs onto the same
    /// lock-free-accessed magazine slot.
    pub fn magazine(&self, cpu: i32) -> &MagazineCell {
        if cpu < 0 {
            &self.slow
        } else {
            debug_assert!(cpu < NR_CPUS as i32, "cpu id out of range: {cpu}");
            &self.magazines[cpu as usize]
        }
    }

    /// The spinlock guarding the magazine returned by `magazine(cpu)`: the
    /// shared lock for the slow magazine, or `None` for a per-CPU one (no
    /// lock needed — the caller's CPU pinning is the only guard).
    pub fn magazine_lock(&self, cpu: i32) -> Option<&Spinlock> {
        if cpu < 0 {
            Some(&self.slow_lock)
        } else {
            None
        }
    }
}

impl Default for BucketHeader {
    fn default() -> Self {
        BucketHeader::new()
    }
}
