//! Architecture-specific primitives, isolated the way `mmtk-core` isolates
//! its own `util/rust_util`/per-target shims: a small stable surface
//! (`spin_hint`, `spin_hint_release`, `dwcas`, turbo toggling) dispatched at
//! compile time with `cfg_if!`, so the rest of the crate never matches on
//! `target_arch` directly.

use portable_atomic::{AtomicU128, Ordering};

mod turbo;

pub use turbo::{check_turbo, configure_turbo};

/// Hint the CPU that we're in a spin-wait body (`pause` on x86, `yield` on
/// aarch64 via `core::hint::spin_loop`). Call on every iteration of a
/// contended spin loop.
#[inline(always)]
pub fn spin_hint() {
    core::hint::spin_loop();
}

/// Hint the end of a spin-wait section. The reference architecture only
/// defines a body hint, not a release hint, on every target it supports; we
/// keep the call site symmetric in case a future target wants one.
#[inline(always)]
pub fn spin_hint_release() {}

/// A 128-bit word split into two independently meaningful 64-bit halves,
/// used as the payload for the "free-list head" + "in-use count" pair that
/// backbone page records and slab remote-free both DWCAS on.
///
/// Backed by `portable_atomic::AtomicU128`, which uses `cmpxchg16b` on
/// `x86_64`/`CMPXCHG16B`-capable targets and a sharded-lock fallback
/// elsewhere. Either way the caller gets the same atomicity contract this
/// crate's DWCAS operations depend on, which is why we don't additionally
/// hand-roll a per-record lock on top.
#[repr(align(16))]
pub struct DwcasCell(AtomicU128);

impl DwcasCell {
    #[inline(always)]
    pub const fn new(hi: u64, lo: u64) -> Self {
        DwcasCell(AtomicU128::new(((hi as u128) << 64) | lo as u128))
    }

    #[inline(always)]
    pub fn load(&self) -> (u64, u64) {
        let v = self.0.load(Ordering::Acquire);
        ((v >> 64) as u64, v as u64)
    }

    /// Publish a new pair with a release fence, for the case where the
    /// record is exclusively owned by the writer (magazine refill cases 2
    /// and 3) and no compare-exchange is needed.
    #[inline(always)]
    pub fn store(&self, hi: u64, lo: u64) {
        let v = ((hi as u128) << 64) | lo as u128;
        self.0.store(v, Ordering::Release);
    }

    /// Attempt to swap `(expected_hi, expected_lo)` for `(new_hi, new_lo)`
    /// in one atomic step. Returns `Ok((hi, lo))` (the value actually
    /// stored, which is `(new_hi, new_lo)`) on success, or `Err((hi, lo))`
    /// with the current value on failure.
    #[inline(always)]
    pub fn compare_exchange(
        &self,
        expected_hi: u64,
        expected_lo: u64,
        new_hi: u64,
        new_lo: u64,
    ) -> Result<(u64, u64), (u64, u64)> {
        let expected = ((expected_hi as u128) << 64) | expected_lo as u128;
        let new = ((new_hi as u128) << 64) | new_lo as u128;
        match self
            .0
            .compare_exchange_weak(expected, new, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok((new_hi, new_lo)),
            Err(v) => Err(((v >> 64) as u64, v as u64)),
        }
    }
}

/// Whether the DWCAS backing this build is a genuine single hardware
/// instruction rather than `portable_atomic`'s lock-sharded fallback. Purely
/// informational (surfaced nowhere in the public API today), kept for
/// diagnostics and for tests that want to assert the fast path is in use on
/// CI runners.
#[inline(always)]
pub fn has_hardware_dwcas() -> bool {
    AtomicU128::is_always_lock_free()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dwcas_round_trips() {
        let cell = DwcasCell::new(1, 2);
        assert_eq!(cell.load(), (1, 2));
        assert_eq!(cell.compare_exchange(1, 2, 3, 4), Ok((3, 4)));
        assert_eq!(cell.load(), (3, 4));
        assert_eq!(cell.compare_exchange(1, 2, 5, 6), Err((3, 4)));
    }
}
