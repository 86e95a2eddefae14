//! Intrusive doubly linked list threaded through `PageRecord::next`/`prev`,
//! used for the backbone free-page list and each bucket's partial/free
//! lists. Every mutating call requires the caller to already hold the lock
//! that guards the particular list (the region mutex, or a bucket
//! spinlock) — the `Relaxed` orderings on the link fields are sound only
//! because of that external synchronization, the same way the reference
//! implementation's `clist_*` helpers assume a held lock.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::backbone::page::PageRecord;

#[derive(Default)]
pub struct PageList {
    head: AtomicPtr<PageRecord>,
    count: AtomicUsize,
}

impl PageList {
    pub const fn new() -> Self {
        PageList {
            head: AtomicPtr::new(ptr::null_mut()),
            count: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Safety
    /// The caller holds the lock guarding this list, and `rec` is not
    /// already linked into any list.
    pub unsafe fn push_front(&self, rec: *mut PageRecord) {
        let old_head = self.head.load(Ordering::Relaxed);
        (*rec).set_prev(ptr::null_mut());
        (*rec).set_next(old_head);
        if !old_head.is_null() {
            (*old_head).set_prev(rec);
        }
        self.head.store(rec, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// # Safety
    /// The caller holds the lock guarding this list.
    pub unsafe fn pop_front(&self) -> *mut PageRecord {
        let head = self.head.load(Ordering::Relaxed);
        if head.is_null() {
            return ptr::null_mut();
        }
        let next = (*head).next();
        self.head.store(next, Ordering::Relaxed);
        if !next.is_null() {
            (*next).set_prev(ptr::null_mut());
        }
        (*head).set_next(ptr::null_mut());
        self.count.fetch_sub(1, Ordering::Relaxed);
        head
    }

    /// Unlink an already-linked node from this list.
    ///
    /// # Safety
    /// The caller holds the lock guarding this list, and `rec` is currently
    /// linked into it.
    pub unsafe fn remove(&self, rec: *mut PageRecord) {
        let prev = (*rec).prev();
        let next = (*rec).next();
        if !prev.is_null() {
            (*prev).set_next(next);
        } else {
            self.head.store(next, Ordering::Relaxed);
        }
        if !next.is_null() {
            (*next).set_prev(prev);
        }
        (*rec).set_next(ptr::null_mut());
        (*rec).set_prev(ptr::null_mut());
        self.count.fetch_sub(1, Ordering::Relaxed);
    }
}
