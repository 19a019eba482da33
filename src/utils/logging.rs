//! Conditional logging macros gated on a module-level `ENABLE_LOGS` flag.
//!
//! Modules with chatty worker loops define
//!
//! ```rust
//! const ENABLE_LOGS: bool = true;
//! ```
//!
//! and use the crate-root macros so verbose tracing can be silenced per
//! module without touching the global log filter.

/// Conditional info logging; checks the `ENABLE_LOGS` const in the calling
/// module.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Conditional warn logging; checks the `ENABLE_LOGS` const in the calling
/// module.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Conditional error logging; checks the `ENABLE_LOGS` const in the calling
/// module.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
