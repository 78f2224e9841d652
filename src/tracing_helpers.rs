//! Span and event helpers for transport operations.
//!
//! Keeps dynamic level selection out of the connection and client code.

use std::time::Instant;

use tracing::{Level, Span};

use crate::tracing_config::TracingConfig;

/// Create a tracing span at a dynamically selected level.
///
/// Each branch expands the matching `tracing::<level>_span!` macro so span
/// metadata stays static per branch.
macro_rules! dynamic_span {
    ($level:expr, $name:expr $(, $($field:tt)*)?) => {
        match $level {
            Level::ERROR => tracing::error_span!($name $(, $($field)*)?),
            Level::WARN  => tracing::warn_span!($name $(, $($field)*)?),
            Level::INFO  => tracing::info_span!($name $(, $($field)*)?),
            Level::DEBUG => tracing::debug_span!($name $(, $($field)*)?),
            Level::TRACE => tracing::trace_span!($name $(, $($field)*)?),
        }
    };
}

pub(crate) fn connect_span(config: &TracingConfig, peer_addr: &str) -> Span {
    dynamic_span!(
        config.connect_level,
        "streamwire.connect",
        peer.addr = peer_addr
    )
}

pub(crate) fn send_span(config: &TracingConfig, payload_bytes: usize) -> Span {
    dynamic_span!(
        config.send_level,
        "streamwire.send",
        payload.bytes = payload_bytes,
        correlation_id = tracing::field::Empty
    )
}

/// The `attempts` and `result` fields are recorded when the call finishes.
pub(crate) fn call_span(config: &TracingConfig) -> Span {
    dynamic_span!(
        config.call_level,
        "streamwire.call",
        attempts = tracing::field::Empty,
        result = tracing::field::Empty
    )
}

pub(crate) fn stop_span(config: &TracingConfig, peer_addr: &str) -> Span {
    dynamic_span!(config.stop_level, "streamwire.stop", peer.addr = peer_addr)
}

/// Emit the elapsed time of a call if timing is enabled.
pub(crate) fn emit_call_timing(config: &TracingConfig, start: Option<Instant>) {
    let Some(start) = start else { return };
    let elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
    match config.call_level {
        Level::ERROR => tracing::error!(elapsed_us, "call completed"),
        Level::WARN => tracing::warn!(elapsed_us, "call completed"),
        Level::INFO => tracing::info!(elapsed_us, "call completed"),
        Level::DEBUG => tracing::debug!(elapsed_us, "call completed"),
        Level::TRACE => tracing::trace!(elapsed_us, "call completed"),
    }
}

/// Start a timer only when call timing is enabled.
pub(crate) fn call_timer(config: &TracingConfig) -> Option<Instant> {
    config.call_timing.then(Instant::now)
}
