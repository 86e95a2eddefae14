//! Per-thread "turbo" FPU mode: Flush-To-Zero and Denormals-Are-Zero. Ported
//! from the reference architecture's `__arch_configure_turbo`/
//! `__arch_check_turbo` (`generic/arch/x86.h`), which toggle the MXCSR FTZ/DAZ
//! bits through the `_MM_SET_FLUSH_ZERO_MODE`/`_MM_SET_DENORMALS_ZERO_MODE`
//! intrinsics. Only meaningful on SSE2-bearing x86/x86_64; every other target
//! treats both calls as no-ops, matching the reference's `#ifdef __SSE2__`
//! gate falling through to "always succeed".

#[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
mod imp {
    use core::arch::x86_64::{_mm_getcsr, _mm_setcsr};

    const FTZ_BIT: u32 = 1 << 15;
    const DAZ_BIT: u32 = 1 << 6;

    pub fn configure_turbo(enabled: bool) {
        unsafe {
            let mut csr = _mm_getcsr();
            if enabled {
                csr |= FTZ_BIT | DAZ_BIT;
            } else {
                csr &= !(FTZ_BIT | DAZ_BIT);
            }
            _mm_setcsr(csr);
        }
    }

    /// Returns `0` if the current thread's FTZ/DAZ state matches `enabled`,
    /// matching the reference implementation's convention of returning a
    /// status rather than aborting — aborting the whole process over a
    /// thread-local FPU mode mismatch is not this crate's call to make.
    pub fn check_turbo(enabled: bool) -> i32 {
        unsafe {
            let csr = _mm_getcsr();
            let on = (csr & (FTZ_BIT | DAZ_BIT)) == (FTZ_BIT | DAZ_BIT);
            if on == enabled {
                0
            } else {
                -1
            }
        }
    }
}

#[cfg(not(all(target_arch = "x86_64", target_feature = "sse2")))]
mod imp {
    pub fn configure_turbo(_enabled: bool) {}

    pub fn check_turbo(_enabled: bool) -> i32 {
        0
    }
}

pub use imp::{check_turbo, configure_turbo};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_then_check_agrees() {
        configure_turbo(true);
        assert_eq!(check_turbo(true), 0);
        configure_turbo(false);
        assert_eq!(check_turbo(false), 0);
    }
}
