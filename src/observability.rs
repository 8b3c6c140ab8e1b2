//! Structured logging helpers.
//!
//! All events go through `tracing` under a single target and carry an `event`
//! field (snake_case) plus a `component` field (`sstable`, `scanner`, `merge`,
//! `builder`). The crate never installs a subscriber.

/// Target for every event emitted by this crate.
pub(crate) const LOG_TARGET: &str = "sstable_reader";

macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::LOG_TARGET, $($field)*)
    };
}

macro_rules! log_trace {
    ($($field:tt)*) => {
        ::tracing::trace!(target: $crate::observability::LOG_TARGET, $($field)*)
    };
}

macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::LOG_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_trace;
pub(crate) use log_warn;
