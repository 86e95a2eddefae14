//! A two-tier shared-memory allocator: a fixed-page backbone over a
//! caller-supplied region, and a size-classed slab with per-CPU magazine
//! caches layered on top.
//!
//! Two API layers are exposed, mirroring how `mmtk-core` separates its
//! inner data structures from its outward `memory_manager` facade:
//!
//! - [`backbone::Backbone`] / [`slab::Slab`]: own a region by raw pointer,
//!   support more than one independently-constructed region per process
//!   (used heavily by this crate's own tests), and carry all the real
//!   methods.
//! - The free functions at the crate root (`backbone_init`, `balloc`,
//!   `bfree`, `slab_init`, `salloc`, `sfree`, `memory_get_size`,
//!   `memory_get_used`, `memory_get_pressure`) operate on a single
//!   process-wide instance, for embedders that want the exact shape of the
//!   embedding contract.

pub mod address;
pub mod arch;
pub mod backbone;
pub mod config;
pub mod constants;
pub mod conversions;
pub mod error;
pub mod list;
pub mod logger;
pub mod pressure;
pub mod rust_util;
pub mod sanitize;
pub mod slab;
pub mod spinlock;

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

pub use backbone::{Backbone, PageRecord};
pub use config::Config;
pub use error::Status;
pub use slab::Slab;

use rust_util::InitializeOnce;

static BACKBONE: InitializeOnce<Backbone> = InitializeOnce::new();

/// Mirrors the reference implementation's `backbone_size` file-scope
/// static: set unconditionally as the first step of `backbone_init`, so
/// `memory_get_size` can answer even if queried before `initialize` has
/// finished (or, for a non-initializing attacher, without ever blocking on
/// the other process's init).
static CONFIGURED_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Attach to (and, if `initialize`, create) the process-wide backbone
/// region over `[start, start + size)`. Must be called exactly once per
/// process before any other function in this module.
///
/// # Safety
/// See [`Backbone::init`]; the same preconditions apply.
pub unsafe fn backbone_init(start: *mut u8, size: usize, initialize: bool) {
    logger::try_init();
    CONFIGURED_SIZE.store(size, Ordering::Relaxed);
    BACKBONE.initialize_once(|| unsafe { Backbone::init(start, size, initialize) });
}

/// Allocate a whole page from the process-wide backbone, or `None` on
/// exhaustion.
///
/// # Panics
/// Panics (via `InitializeOnce`'s debug assertion) if called before
/// `backbone_init`.
pub fn balloc() -> Option<NonNull<PageRecord>> {
    BACKBONE.get_ref().balloc()
}

/// Release a whole page back to the process-wide backbone.
pub fn bfree(record: NonNull<PageRecord>) {
    BACKBONE.get_ref().bfree(record)
}

/// Initialize the slab buckets inside the already-initialized process-wide
/// backbone. Call once, after `backbone_init(..., initialize: true)`.
pub fn slab_init() {
    Slab::init(BACKBONE.get_ref());
}

/// Allocate an object of `size` bytes from the process-wide slab. `cpu < 0`
/// routes through the shared slow magazine.
pub fn salloc(size: usize, cpu: i32) -> Option<NonNull<u8>> {
    Slab::attach(BACKBONE.get_ref()).salloc(size, cpu)
}

/// Release an object previously returned by `salloc`. `size` must match the
/// originating `salloc` call.
pub fn sfree(ptr: NonNull<u8>, size: usize, cpu: i32) {
    Slab::attach(BACKBONE.get_ref()).sfree(ptr, size, cpu)
}

/// Total configured region size in bytes. Answers from the value recorded
/// by `backbone_init` even if the region itself is still being set up by
/// its initializing attacher.
pub fn memory_get_size(out: &mut usize) -> Status {
    *out = CONFIGURED_SIZE.load(Ordering::Relaxed);
    Status::Success
}

/// Bytes currently in use: `size - backbone_free_page_count * PAGE_SIZE`.
pub fn memory_get_used(out: &mut usize) -> Status {
    match BACKBONE.try_get_ref() {
        Some(b) => pressure::used(b, out),
        None => Status::NotInitialized,
    }
}

/// Used bytes divided by total size, as a float in `(0, 1]`.
pub fn memory_get_pressure(out: &mut f32) -> Status {
    match BACKBONE.try_get_ref() {
        Some(b) => pressure::pressure(b, out),
        None => Status::NotInitialized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The process-wide facade is a true global singleton, so only one test
    // may drive it; every other scenario is covered against freestanding
    // `Backbone`/`Slab` instances in `backbone::region` and `slab`.
    #[test]
    fn facade_round_trips_through_global_singleton() {
        let size = 1 << 20;
        let mut buf = vec![0u8; size];
        unsafe {
            backbone_init(buf.as_mut_ptr(), size, true);
        }
        slab_init();

        let mut reported_size = 0;
        assert_eq!(memory_get_size(&mut reported_size), Status::Success);
        assert_eq!(reported_size, size);

        let ptr = salloc(32, 0).expect("allocation should succeed");
        sfree(ptr, 32, 0);

        let mut used = 0;
        assert_eq!(memory_get_used(&mut used), Status::Success);
        let mut p = 0.0f32;
        assert_eq!(memory_get_pressure(&mut p), Status::Success);
        assert!(p > 0.0 && p <= 1.0);

        // Keep `buf` alive for the duration of the process-wide backbone;
        // dropping it early would dangle the global singleton's pointer.
        std::mem::forget(buf);
    }
}
