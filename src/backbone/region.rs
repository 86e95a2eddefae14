//! The backbone region: header layout, initialization, and the whole-page
//! `balloc`/`bfree` pair. Ported from `memory/backbone.c`'s
//! `backbone_alloc_init`/`balloc`/`bfree`/`backbone_used_memory`.

use std::cell::UnsafeCell;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, trace};

use crate::address::Address;
use crate::backbone::page::PageRecord;
use crate::constants::{BUCKETS, PAGE_SIZE};
use crate::list::PageList;
use crate::slab::bucket::BucketHeader;

/// A `pthread_mutex_t` configured `PTHREAD_PROCESS_SHARED`, so the region
/// mutex works correctly when mapped into more than one process's address
/// space — the reason this isn't just a `std::sync::Mutex`.
#[repr(C)]
pub struct CrossProcessMutex {
    raw: UnsafeCell<libc::pthread_mutex_t>,
}

impl CrossProcessMutex {
    /// Called only by the first attacher. Installs a process-shared mutex
    /// attribute so other processes mapping this region can lock the same
    /// mutex.
    fn init_process_shared(&self) {
        unsafe {
            let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
            libc::pthread_mutexattr_init(&mut attr);
            libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
            libc::pthread_mutex_init(self.raw.get(), &attr);
            libc::pthread_mutexattr_destroy(&mut attr);
        }
    }

    fn lock(&self) {
        unsafe {
            libc::pthread_mutex_lock(self.raw.get());
        }
    }

    fn unlock(&self) {
        unsafe {
            libc::pthread_mutex_unlock(self.raw.get());
        }
    }

    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        self.lock();
        struct Guard<'a>(&'a CrossProcessMutex);
        impl Drop for Guard<'_> {
            fn drop(&mut self) {
                self.0.unlock();
            }
        }
        let _g = Guard(self);
        f()
    }
}

unsafe impl Sync for CrossProcessMutex {}

/// Fixed-offset region header: the cross-process mutex, the intrusive
/// free-page list head, and the bucket array, in that order — matching the
/// persisted layout `[header | pad16 | page_record[P'] | pad_page |
/// page[P]]` from the external interface description.
#[repr(C)]
pub struct RegionHeader {
    mutex: CrossProcessMutex,
    free_pages: PageList,
    free_count: AtomicUsize,
    pub buckets: [BucketHeader; BUCKETS],
}

impl RegionHeader {
    fn new() -> Self {
        RegionHeader {
            mutex: CrossProcessMutex {
                raw: UnsafeCell::new(unsafe { std::mem::zeroed() }),
            },
            free_pages: PageList::new(),
            free_count: AtomicUsize::new(0),
            buckets: std::array::from_fn(|_| BucketHeader::new()),
        }
    }
}

/// A backbone: a fixed byte range carved into a header, a page-metadata
/// array, and a page store, with whole-page allocation guarded by the
/// region mutex.
///
/// Wraps a raw pointer rather than a Rust-owned allocation because the
/// region is caller-supplied (possibly shared memory mapped by more than
/// one process) and outlives this handle.
pub struct Backbone {
    header: NonNull<RegionHeader>,
    metadata_start: Address,
    pages_start: Address,
    page_count: usize,
    region_size: usize,
}

// The region is reached only through atomics and locks from here down;
// sharing a `Backbone` handle across threads is sound.
unsafe impl Send for Backbone {}
unsafe impl Sync for Backbone {}

impl Backbone {
    /// Compute the region's layout: header, 16-byte-aligned metadata array,
    /// page-size-aligned page store, with the page count recomputed from
    /// the padding actually needed (mirrors `backbone_alloc_init`'s
    /// two-pass computation).
    fn layout(start: Address, size: usize) -> (Address, Address, usize) {
        let header_size = std::mem::size_of::<RegionHeader>();
        let record_size = std::mem::size_of::<PageRecord>();

        let tentative_pages = (size - header_size) / (record_size + PAGE_SIZE);

        let metadata_start = (start + header_size).align_up(16);
        let pages_start = (metadata_start + tentative_pages * record_size).align_up(PAGE_SIZE);

        let end = start + size;
        let page_count = (end - pages_start) / PAGE_SIZE;

        (metadata_start, pages_start, page_count)
    }

    /// Attach to (and, if `initialize`, create) a backbone over
    /// `[start, start + size)`.
    ///
    /// # Safety
    /// `start` must be valid for reads and writes for `size` bytes for the
    /// lifetime of the returned `Backbone`, suitably aligned, and — if more
    /// than one process attaches it — mapped at a congruent offset in each
    /// (see the cross-process pointer caveat in the design notes). Only one
    /// attacher may pass `initialize = true`, and every other attacher must
    /// synchronize externally so it does not race that initializer.
    pub unsafe fn init(start: *mut u8, size: usize, initialize: bool) -> Backbone {
        let start_addr = Address::from_mut_ptr(start);
        let (metadata_start, pages_start, page_count) = Self::layout(start_addr, size);
        let header_ptr = start as *mut RegionHeader;

        if initialize {
            debug!(
                "backbone: initializing region of {} bytes, {} pages",
                size, page_count
            );
            ptr::write(header_ptr, RegionHeader::new());
            let header = &*header_ptr;
            header.mutex.init_process_shared();

            let mut page_addr = pages_start;
            for i in 0..page_count {
                let record_ptr = (metadata_start + i * std::mem::size_of::<PageRecord>())
                    .to_mut_ptr::<PageRecord>();
                PageRecord::init_in_place(record_ptr, page_addr);
                header.free_pages.push_front(record_ptr);
                page_addr += PAGE_SIZE;
            }
            header.free_count.store(page_count, Ordering::Relaxed);
        } else {
            debug!(
                "backbone: attaching to existing region of {} bytes, {} pages",
                size, page_count
            );
        }

        Backbone {
            header: NonNull::new(header_ptr).expect("region start must not be null"),
            metadata_start,
            pages_start,
            page_count,
            region_size: size,
        }
    }

    #[inline(always)]
    fn header(&self) -> &RegionHeader {
        unsafe { self.header.as_ref() }
    }

    pub fn bucket(&self, index: usize) -> &BucketHeader {
        &self.header().buckets[index]
    }

    /// Total region size in bytes, including header and padding.
    pub fn size(&self) -> usize {
        self.region_size
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Take a page from the backbone free-page list, or `None` if exhausted.
    pub fn balloc(&self) -> Option<NonNull<PageRecord>> {
        let header = self.header();
        header.mutex.with_lock(|| {
            let rec = unsafe { header.free_pages.pop_front() };
            if rec.is_null() {
                trace!("balloc: backbone exhausted");
                None
            } else {
                header.free_count.fetch_sub(1, Ordering::Relaxed);
                NonNull::new(rec)
            }
        })
    }

    /// Return a whole page to the backbone free-page list.
    pub fn bfree(&self, record: NonNull<PageRecord>) {
        let header = self.header();
        header.mutex.with_lock(|| unsafe {
            header.free_pages.push_front(record.as_ptr());
            header.free_count.fetch_add(1, Ordering::Relaxed);
        });
    }

    /// `used = size - free_page_count * PAGE_SIZE`. Partial/free-list/
    /// magazine-cached pages at the slab level all still count as "used"
    /// here — only pages still sitting in the backbone's own free list are
    /// not.
    pub fn used(&self) -> usize {
        let free = self.header().free_count.load(Ordering::Relaxed);
        self.region_size - free * PAGE_SIZE
    }

    pub fn pressure(&self) -> f32 {
        self.used() as f32 / self.region_size as f32
    }

    /// Address a page-metadata index maps to, for round-tripping an object
    /// pointer back to its owning `PageRecord` (used by slab remote free).
    pub fn record_for_page(&self, page_addr: Address) -> NonNull<PageRecord> {
        let index = (page_addr - self.pages_start) / PAGE_SIZE;
        debug_assert!(index < self.page_count);
        let ptr = (self.metadata_start + index * std::mem::size_of::<PageRecord>())
            .to_mut_ptr::<PageRecord>();
        NonNull::new(ptr).expect("page record address must not be null")
    }
}
