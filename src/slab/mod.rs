//! Tier two: size-class buckets with per-CPU magazine caches on top of the
//! backbone. Ported from `memory/slab.c` — `bucket_alloc`/`bucket_free`/
//! `bucket_refill_cpu_cache` become `Slab::{salloc, sfree, refill}` below,
//! one-for-one with the reference control flow, including which lock is
//! held across which step.

pub mod bucket;
pub mod magazine;

use std::ptr::NonNull;

use log::trace;

use crate::address::Address;
use crate::backbone::{Backbone, PageRecord};
use crate::constants::{BUCKETS, MIN_K, PAGE_SIZE, SLAB_MAX_FREE_PAGES};
use crate::conversions::ceil_log2;
use crate::sanitize;
use crate::slab::bucket::BucketHeader;
use crate::slab::magazine::Magazine;

/// The slab layer, borrowing the backbone it draws fresh pages from. Stores
/// no state of its own beyond that borrow — all bucket state lives inside
/// the backbone's region header, since the buckets must be reachable by
/// every process attached to the region.
pub struct Slab<'a> {
    backbone: &'a Backbone,
}

impl<'a> Slab<'a> {
    /// Initialize the bucket array inside an already-initialized backbone.
    /// Only the first attacher should call this — later attachers simply
    /// construct a `Slab` over the already-initialized buckets.
    pub fn init(backbone: &'a Backbone) -> Slab<'a> {
        for i in 0..BUCKETS {
            let obj_size = 1usize << (MIN_K as usize + i);
            backbone.bucket(i).set_obj_size(obj_size);
        }
        Slab { backbone }
    }

    /// Bind to a backbone whose buckets were already initialized by another
    /// attacher.
    pub fn attach(backbone: &'a Backbone) -> Slab<'a> {
        Slab { backbone }
    }

    fn bucket_index_for_size(size: usize) -> Option<usize> {
        debug_assert!(size > 0);
        let k = ceil_log2(size).max(MIN_K);
        if k as usize >= MIN_K as usize + BUCKETS {
            None
        } else {
            Some(k as usize - MIN_K as usize)
        }
    }

    /// Allocate an object of `size` bytes, rounded up to a power-of-two
    /// size class. `cpu < 0` routes through the bucket's shared slow
    /// magazine. Returns `None` if `size` exceeds the largest size class,
    /// or if the backbone is exhausted during a refill.
    pub fn salloc(&self, size: usize, cpu: i32) -> Option<NonNull<u8>> {
        let idx = Self::bucket_index_for_size(size)?;
        let bucket = self.backbone.bucket(idx);
        self.bucket_alloc(bucket, cpu, size)
    }

    /// Release an object previously returned by `salloc`. `size` must be
    /// the same value passed to the originating `salloc` call, since it is
    /// used to recover the size class — see the design notes on the
    /// assert-on-mismatch contract this mirrors from the source.
    pub fn sfree(&self, ptr: NonNull<u8>, size: usize, cpu: i32) {
        let idx = Self::bucket_index_for_size(size)
            .expect("sfree: size does not map to any slab size class");
        let bucket = self.backbone.bucket(idx);
        self.bucket_free(bucket, ptr, cpu);
    }

    fn bucket_alloc(&self, bucket: &BucketHeader, cpu: i32, request_size: usize) -> Option<NonNull<u8>> {
        let slow_lock = bucket.magazine_lock(cpu);
        if let Some(lock) = slow_lock {
            lock.lock();
        }

        let magazine_cell = bucket.magazine(cpu);
        let result = (|| {
            let mag = unsafe { magazine_cell.get() };
            if let Some(obj) = Self::pop_from_magazine(mag, request_size) {
                return Some(obj);
            }
            if !self.refill(bucket, mag) {
                return None;
            }
            let obj = Self::pop_from_magazine(mag, request_size);
            debug_assert!(obj.is_some(), "post-refill magazine pop must succeed");
            obj
        })();

        if let Some(lock) = slow_lock {
            lock.unlock();
        }
        result
    }

    fn pop_from_magazine(mag: &mut Magazine, unpoison_size: usize) -> Option<NonNull<u8>> {
        if mag.freelist == 0 {
            return None;
        }
        let addr = unsafe { Address::from_usize(mag.freelist) };
        sanitize::unpoison(addr, unpoison_size);
        let next = unsafe { addr.load_usize() };
        mag.freelist = next;
        NonNull::new(addr.to_mut_ptr::<u8>())
    }

    /// Refill `mag` from `bucket`'s partial list, then free list, then a
    /// fresh backbone page, in that order. Returns `false` only when the
    /// backbone itself is exhausted.
    fn refill(&self, bucket: &BucketHeader, mag: &mut Magazine) -> bool {
        let obj_in_page = bucket.objects_per_page(PAGE_SIZE);
        bucket.lock.lock();

        if !bucket.partial.is_empty() {
            let rec_ptr = unsafe { bucket.partial.pop_front() };
            let rec = unsafe { &*rec_ptr };
            let (mut fl, mut inuse) = rec.load_state();
            loop {
                match rec.compare_exchange_state(fl, inuse, 0, obj_in_page) {
                    Ok(_) => break,
                    Err((new_fl, new_inuse)) => {
                        fl = new_fl;
                        inuse = new_inuse;
                    }
                }
            }
            bucket.lock.unlock();
            mag.page = rec_ptr;
            mag.freelist = fl;
            trace!("slab: refilled magazine from partial list");
            true
        } else if !bucket.free.is_empty() {
            let rec_ptr = unsafe { bucket.free.pop_front() };
            bucket.lock.unlock();
            // Nobody else can be touching this record: it was just popped
            // from a list only reachable under the bucket lock, and no
            // magazine or remote-free path holds a reference to it yet.
            let rec = unsafe { &*rec_ptr };
            let (fl, _inuse) = rec.load_state();
            rec.publish_state(0, obj_in_page);
            mag.page = rec_ptr;
            mag.freelist = fl;
            trace!("slab: refilled magazine from bucket free list");
            true
        } else {
            bucket.lock.unlock();
            let rec_nn = match self.backbone.balloc() {
                Some(r) => r,
                None => {
                    trace!("slab: refill failed, backbone exhausted");
                    return false;
                }
            };
            let rec_ptr = rec_nn.as_ptr();
            self.initialize_page(bucket, rec_ptr);
            let rec = unsafe { &*rec_ptr };
            let head = rec.addr().as_usize();
            rec.publish_state(0, obj_in_page);
            mag.page = rec_ptr;
            mag.freelist = head;
            trace!("slab: refilled magazine from a fresh backbone page");
            true
        }
    }

    /// Thread a fresh page into an in-page freelist of `bucket.obj_size()`
    /// chunks. The whole page is briefly unpoisoned to write the links,
    /// then fully poisoned again.
    fn initialize_page(&self, bucket: &BucketHeader, rec_ptr: *mut PageRecord) {
        let rec = unsafe { &*rec_ptr };
        let base = rec.addr();
        let obj_size = bucket.obj_size();
        let obj_in_page = bucket.objects_per_page(PAGE_SIZE);

        sanitize::unpoison(base, PAGE_SIZE);
        for i in 0..obj_in_page {
            let chunk = base + i * obj_size;
            let next = if i + 1 < obj_in_page {
                (base + (i + 1) * obj_size).as_usize()
            } else {
                0
            };
            unsafe { chunk.store_usize(next) };
        }
        sanitize::poison(base, PAGE_SIZE);
    }

    fn bucket_free(&self, bucket: &BucketHeader, obj: NonNull<u8>, cpu: i32) {
        let obj_size = bucket.obj_size();
        let obj_addr = unsafe { Address::from_mut_ptr(obj.as_ptr()) };

        if cpu >= 0 {
            let magazine_cell = bucket.magazine(cpu);
            let mag = unsafe { magazine_cell.get() };
            if mag.has_page() {
                let page_rec = unsafe { &*mag.page };
                let base = page_rec.addr();
                if obj_addr.as_usize() >= base.as_usize()
                    && obj_addr.as_usize() < base.as_usize() + PAGE_SIZE
                {
                    unsafe { obj_addr.store_usize(mag.freelist) };
                    mag.freelist = obj_addr.as_usize();
                    sanitize::poison(obj_addr, obj_size);
                    return;
                }
            }
        }

        self.remote_free(bucket, obj_addr, obj_size);
    }

    /// Free an object whose owning page is not the freeing CPU's cached
    /// page. Updates `(freelist, inuse)` via a DWCAS loop, speculatively
    /// taking the bucket lock when the free might cause a list-membership
    /// transition (the page becoming fully empty, or leaving the "full"
    /// state), exactly as `bucket_free`'s remote path does.
    fn remote_free(&self, bucket: &BucketHeader, obj_addr: Address, obj_size: usize) {
        let obj_in_page = bucket.objects_per_page(PAGE_SIZE);
        let page_base = obj_addr.align_down(PAGE_SIZE);
        let rec_nn = self.backbone.record_for_page(page_base);
        let rec = unsafe { rec_nn.as_ref() };

        loop {
            let (fl, inuse) = rec.load_state();
            unsafe { obj_addr.store_usize(fl) };

            let needs_lock = inuse == obj_in_page || inuse == 1;
            if needs_lock {
                bucket.lock.lock();
            }

            sanitize::poison(obj_addr, obj_size);

            match rec.compare_exchange_state(fl, inuse, obj_addr.as_usize(), inuse - 1) {
                Ok(_) => {
                    if inuse == 1 {
                        unsafe { bucket.partial.remove(rec_nn.as_ptr()) };
                        if bucket.free.len() >= SLAB_MAX_FREE_PAGES {
                            bucket.lock.unlock();
                            self.backbone.bfree(rec_nn);
                        } else {
                            unsafe { bucket.free.push_front(rec_nn.as_ptr()) };
                            bucket.lock.unlock();
                        }
                    } else if inuse == obj_in_page {
                        unsafe { bucket.partial.push_front(rec_nn.as_ptr()) };
                        bucket.lock.unlock();
                    }
                    return;
                }
                Err(_) => {
                    if needs_lock {
                        bucket.lock.unlock();
                    }
                    sanitize::unpoison(obj_addr, obj_size);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_region(size: usize) -> (Vec<u8>, Backbone) {
        let mut buf = vec![0u8; size];
        let backbone = unsafe { Backbone::init(buf.as_mut_ptr(), size, true) };
        (buf, backbone)
    }

    #[test]
    fn alloc_free_round_trip_single_cpu() {
        let (_buf, backbone) = make_region(1 << 20);
        let slab = Slab::init(&backbone);

        let before = backbone.used();
        let ptr = slab.salloc(24, 0).expect("allocation should succeed");
        slab.sfree(ptr, 24, 0);
        assert_eq!(backbone.used(), before);
    }

    #[test]
    fn oversized_request_returns_none() {
        let (_buf, backbone) = make_region(1 << 20);
        let slab = Slab::init(&backbone);
        assert!(slab.salloc(1 << 20, 0).is_none());
    }

    #[test]
    fn cross_cpu_remote_free_returns_page_to_free_list() {
        let (_buf, backbone) = make_region(1 << 20);
        let slab = Slab::init(&backbone);

        let obj_in_page = PAGE_SIZE / 64;
        let mut ptrs = Vec::new();
        for _ in 0..obj_in_page {
            ptrs.push(slab.salloc(64, 0).unwrap());
        }
        for p in ptrs {
            slab.sfree(p, 64, 1);
        }

        let bucket = backbone.bucket(Slab::bucket_index_for_size(64).unwrap());
        assert_eq!(bucket.partial.len(), 0);
        assert_eq!(bucket.free.len(), 1);
    }

    #[test]
    fn slow_magazine_serves_negative_cpu() {
        let (_buf, backbone) = make_region(1 << 20);
        let slab = Slab::init(&backbone);
        let ptr = slab.salloc(32, -1).expect("slow magazine allocation");
        slab.sfree(ptr, 32, -1);
    }
}
