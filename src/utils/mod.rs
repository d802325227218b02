pub mod errors;

/// Logs at warn level through the `log` crate when the `murmur-logging` feature is enabled,
/// falling back to stderr otherwise. Mirrors the dual-branch logging convention used
/// throughout this crate so the library stays usable without pulling in a logger.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "murmur-logging")]
        {
            log::warn!($($arg)*);
        }
        #[cfg(not(feature = "murmur-logging"))]
        {
            eprintln!($($arg)*);
        }
    }};
}

/// Logs at debug level through the `log` crate when the `murmur-logging` feature is enabled.
/// No stderr fallback: debug-level chatter shouldn't show up unsolicited on stderr.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "murmur-logging")]
        {
            log::debug!($($arg)*);
        }
    }};
}
