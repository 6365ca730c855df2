//! Logging shims that compile out when the `log` feature is disabled.
//!
//! The warning shim is defined under an internal name and renamed on
//! re-export: a macro named `warn` would be ambiguous with the built-in
//! `#[warn]` attribute.

cfg_if::cfg_if! {
    if #[cfg(feature = "log")] {
        macro_rules! debug {
            ($($arg:tt)*) => { log::debug!($($arg)*) };
        }
        macro_rules! warn_ {
            ($($arg:tt)*) => { log::warn!($($arg)*) };
        }
        macro_rules! error {
            ($($arg:tt)*) => { log::error!($($arg)*) };
        }
    } else {
        macro_rules! debug {
            ($($arg:tt)*) => {{}};
        }
        macro_rules! warn_ {
            ($($arg:tt)*) => {{}};
        }
        macro_rules! error {
            ($($arg:tt)*) => {{}};
        }
    }
}

pub(crate) use {debug, error, warn_ as warn};
