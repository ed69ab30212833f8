//! Stream performance logging macros
//!
//! Per-chunk timing and progress lines are useful while developing against a
//! provider but too chatty for release builds, where these compile to no-ops.
//! The first argument is the label (usually the endpoint name) that prefixes
//! each line.

/// Stream performance debug logging - only active in debug builds
#[cfg(debug_assertions)]
#[macro_export]
macro_rules! stream_perf {
    ($label:expr, $($arg:tt)*) => {
        log::debug!("[{}] {}", $label, format_args!($($arg)*))
    };
}

/// Stream performance debug logging - no-op in release builds
#[cfg(not(debug_assertions))]
#[macro_export]
macro_rules! stream_perf {
    ($label:expr, $($arg:tt)*) => {};
}

/// Stream trace logging (raw records) - only active in debug builds
#[cfg(debug_assertions)]
#[macro_export]
macro_rules! stream_trace {
    ($label:expr, $($arg:tt)*) => {
        log::trace!("[{}] {}", $label, format_args!($($arg)*))
    };
}

/// Stream trace logging - no-op in release builds
#[cfg(not(debug_assertions))]
#[macro_export]
macro_rules! stream_trace {
    ($label:expr, $($arg:tt)*) => {};
}
