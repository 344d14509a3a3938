//! crates/logging/src/tracing_macros.rs
//! Convenience macros for subsystem tracing.
//!
//! These macros provide ergonomic wrappers around standard tracing macros
//! with the fixed target of each subsystem, so filters such as
//! `uds::state=debug` select one layer of the stack.

/// Emit an IO region or factory trace.
///
/// # Example
/// ```ignore
/// trace_io!("region read at {} ({} bytes)", offset, len);
/// ```
#[macro_export]
macro_rules! trace_io {
    ($($arg:tt)*) => {
        ::tracing::debug!(target: "uds::io", $($arg)*);
    };
}

/// Emit a buffer-cache shim trace.
///
/// # Example
/// ```ignore
/// trace_bufio!("write-through block {}", block);
/// ```
#[macro_export]
macro_rules! trace_bufio {
    ($($arg:tt)*) => {
        ::tracing::debug!(target: "uds::bufio", $($arg)*);
    };
}

/// Emit an index component trace.
///
/// # Example
/// ```ignore
/// trace_index!("opened {} zones for {}", zones, name);
/// ```
#[macro_export]
macro_rules! trace_index {
    ($($arg:tt)*) => {
        ::tracing::debug!(target: "uds::index", $($arg)*);
    };
}

/// Emit an index state lifecycle trace.
///
/// # Example
/// ```ignore
/// trace_state!("committed save of {}", dir);
/// ```
#[macro_export]
macro_rules! trace_state {
    ($($arg:tt)*) => {
        ::tracing::info!(target: "uds::state", $($arg)*);
    };
}

/// Emit a request queue trace.
///
/// # Example
/// ```ignore
/// trace_queue!("worker woke after {} ns", wait);
/// ```
#[macro_export]
macro_rules! trace_queue {
    ($($arg:tt)*) => {
        ::tracing::trace!(target: "uds::queue", $($arg)*);
    };
}
