//! Per-page metadata record, ported from the reference `page_metadata_t`
//! (`memory/backbone.h`): an intrusive list hook, the `(freelist, inuse)`
//! pair DWCAS operates on, and the page's own base address. One of these
//! lives in the metadata array for every page the backbone carved out of
//! the region, 16-byte aligned so the DWCAS pair can never straddle a cache
//! line boundary the hardware primitive can't reach.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::address::Address;
use crate::arch::DwcasCell;

#[repr(C)]
pub struct PageRecord {
    next: AtomicPtr<PageRecord>,
    prev: AtomicPtr<PageRecord>,
    state: DwcasCell,
    addr: AtomicUsize,
}

impl PageRecord {
    /// Write the record's initial state in place. Called once per record,
    /// by the first attacher, before the page is handed to any bucket.
    pub fn init_in_place(this: *mut PageRecord, addr: Address) {
        unsafe {
            ptr::write(
                this,
                PageRecord {
                    next: AtomicPtr::new(ptr::null_mut()),
                    prev: AtomicPtr::new(ptr::null_mut()),
                    state: DwcasCell::new(0, 0),
                    addr: AtomicUsize::new(addr.as_usize()),
                },
            );
        }
    }

    #[inline(always)]
    pub fn addr(&self) -> Address {
        unsafe { Address::from_usize(self.addr.load(Ordering::Relaxed)) }
    }

    #[inline(always)]
    pub fn next(&self) -> *mut PageRecord {
        self.next.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn set_next(&self, p: *mut PageRecord) {
        self.next.store(p, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn prev(&self) -> *mut PageRecord {
        self.prev.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn set_prev(&self, p: *mut PageRecord) {
        self.prev.store(p, Ordering::Relaxed);
    }

    /// Read the current `(freelist_addr, inuse)` pair. `freelist_addr == 0`
    /// means the in-page freelist is empty (the page is full), not that the
    /// page is unowned.
    #[inline(always)]
    pub fn load_state(&self) -> (usize, usize) {
        let (hi, lo) = self.state.load();
        (hi as usize, lo as usize)
    }

    /// Publish `(freelist_addr, inuse)` directly, for the case where the
    /// caller has exclusive ownership of the record (magazine refill cases
    /// 2 and 3 — the record was just unlinked from a bucket list, or was
    /// never linked anywhere yet). Uses a release fence so a freshly
    /// threaded in-page freelist is visible before any consumer reads it.
    #[inline(always)]
    pub fn publish_state(&self, freelist_addr: usize, inuse: usize) {
        self.state.store(freelist_addr as u64, inuse as u64);
    }

    /// Attempt `(expected_fl, expected_inuse) -> (new_fl, new_inuse)`.
    #[inline(always)]
    pub fn compare_exchange_state(
        &self,
        expected_freelist: usize,
        expected_inuse: usize,
        new_freelist: usize,
        new_inuse: usize,
    ) -> Result<(usize, usize), (usize, usize)> {
        match self.state.compare_exchange(
            expected_freelist as u64,
            expected_inuse as u64,
            new_freelist as u64,
            new_inuse as u64,
        ) {
            Ok((hi, lo)) => Ok((hi as usize, lo as usize)),
            Err((hi, lo)) => Err((hi as usize, lo as usize)),
        }
    }
}

// `PageRecord` lives inside a shared memory region and is reached through
// raw pointers shared across threads (and potentially processes); all its
// fields are atomics, so sharing references across threads is sound.
unsafe impl Sync for PageRecord {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_cas_round_trips() {
        let mut storage: PageRecord = unsafe { std::mem::zeroed() };
        let addr = unsafe { Address::from_usize(0x1000) };
        PageRecord::init_in_place(&mut storage as *mut _, addr);

        assert_eq!(storage.addr(), addr);
        assert_eq!(storage.load_state(), (0, 0));

        assert_eq!(
            storage.compare_exchange_state(0, 0, 0x2000, 1),
            Ok((0x2000, 1))
        );
        assert_eq!(
            storage.compare_exchange_state(0, 0, 0x3000, 2),
            Err((0x2000, 1))
        );
    }
}
