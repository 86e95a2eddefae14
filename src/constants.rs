//! Compile-time tunables. Kept as plain `pub const`s rather than Cargo
//! features or a runtime `Options` struct, the way `mmtk-core` keeps its
//! truly fixed layout constants (e.g. `util/constants.rs`) separate from its
//! runtime-tunable `util/options.rs` — these are layout-affecting and fixed
//! at build time per spec.md §6.

/// Size, in bytes, of a single backbone page. Must be a power of two.
pub const PAGE_SIZE: usize = 4096;

/// log2 of the smallest slab size class. `2^MIN_K` bytes is the smallest
/// object a bucket will ever hand out.
pub const MIN_K: u32 = 4; // 16 bytes

/// Number of size-class buckets, covering `2^MIN_K ..= 2^(MIN_K + BUCKETS - 1)`.
/// With `MIN_K = 4` this covers 16 B .. 2 KiB, safely under one page.
pub const BUCKETS: usize = 8;

/// High-water mark for a bucket's cached-but-empty page list (spec.md §4.4,
/// §9). Pages beyond this cap are returned to the backbone instead of
/// being retained.
pub const SLAB_MAX_FREE_PAGES: usize = 16;

/// Number of logical CPU slots each bucket reserves a magazine for. Callers
/// supply a logical CPU id in `[0, NR_CPUS)`; `c < 0` routes through the
/// shared "slow" magazine instead.
pub const NR_CPUS: usize = 256;

static_assertions::const_assert!(PAGE_SIZE.is_power_of_two());
static_assertions::const_assert!(BUCKETS > 0);
static_assertions::const_assert!((MIN_K as usize) + BUCKETS - 1 < PAGE_SIZE.trailing_zeros() as usize);

/// Largest object size a bucket will serve, in bytes.
pub const MAX_SLAB_OBJECT: usize = 1 << (MIN_K as usize + BUCKETS - 1);
