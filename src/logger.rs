//! Built-in logger bootstrap, adapted from `mmtk-core`'s `util/logger.rs`
//! almost verbatim: a convenience `env_logger` init gated by the
//! `builtin_env_logger` Cargo feature, so embedders get sensible logging
//! out of the box but can disable the feature and wire up their own `log`
//! backend instead.

/// Attempt to init a built-in `env_logger`. Does nothing if the
/// `builtin_env_logger` feature is disabled, and does nothing (besides a
/// debug log) if a logger is already installed.
pub fn try_init() {
    cfg_if::cfg_if! {
        if #[cfg(feature = "builtin_env_logger")] {
            let result = env_logger::try_init_from_env(
                env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
            );

            match result {
                Ok(()) => {
                    log::debug!("duoslab initialized the logger.");
                }
                Err(e) => {
                    log::debug!("duoslab failed to initialize the built-in env_logger: {e}");
                }
            }
        } else {
            log::debug!("duoslab didn't initialize the built-in env_logger; the \"builtin_env_logger\" feature is disabled.");
        }
    }
}
