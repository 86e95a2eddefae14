//! Runtime configuration, carried explicitly rather than as a global — the
//! same shape `mmtk-core` threads an `Options`/`MMTKBuilder` value through
//! `mmtk_init` instead of reaching for statics.
//!
//! The reference implementation keeps a single `nosv_config.turbo_enabled`
//! flag that the arch shim consults on thread entry/exit; we carry the same
//! bit of state, just passed to the two calls that need it instead of read
//! from a global.

#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Whether worker threads are expected to run with FTZ/DAZ enabled.
    pub turbo_enabled: bool,
}

impl Config {
    pub const fn new(turbo_enabled: bool) -> Self {
        Config { turbo_enabled }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(false)
    }
}

/// Number of logical CPUs the OS reports, for embedders choosing the range
/// of CPU ids they'll pass to `salloc`/`sfree`. The allocator itself never
/// calls this — the caller-supplied CPU id is trusted as-is — but picking a
/// sane `NR_CPUS` upper bound for a given host is the embedder's problem,
/// not the allocator's, so we surface the detection primitive rather than
/// hide it.
pub fn available_parallelism() -> usize {
    num_cpus::get()
}

/// Apply `cfg.turbo_enabled` to the current thread's FPU control register.
pub fn configure_turbo(cfg: &Config) {
    crate::arch::configure_turbo(cfg.turbo_enabled);
}

/// Returns `0` if the current thread's FPU state matches `cfg.turbo_enabled`,
/// matching `arch::check_turbo`'s convention.
pub fn check_turbo(cfg: &Config) -> i32 {
    crate::arch::check_turbo(cfg.turbo_enabled)
}
