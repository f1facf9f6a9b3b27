//! Logging macros gated by a module-level `ENABLE_LOGS` switch.
//!
//! The capture and orchestration modules are chatty; each one declares
//!
//! ```rust,ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_debug, log_error, log_info, log_warn};
//! ```
//!
//! and can silence itself without touching `RUST_LOG` for the rest of the
//! process. Everything still goes through the `log` facade, so `env_logger`
//! filtering applies on top.

/// `log::info!` if the calling module has `ENABLE_LOGS` set.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// `log::warn!` if the calling module has `ENABLE_LOGS` set.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// `log::error!` if the calling module has `ENABLE_LOGS` set.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

/// `log::debug!` if the calling module has `ENABLE_LOGS` set.
///
/// Used for per-window chatter in the locator, which would otherwise drown
/// the run-level messages at info level.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}
