//! Metric helpers for `streamwire`.
//!
//! This module defines metric names, simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate, and [`MetricsProbe`], a
//! [`Probe`] that publishes transport events through them.

use metrics::{counter, gauge};

use crate::{
    error::{ConnectError, TransportError},
    probe::Probe,
};

/// Name of the gauge tracking live connections.
pub const CONNECTIONS_ACTIVE: &str = "streamwire_connections_active";
/// Name of the counter tracking frames crossing the socket.
pub const FRAMES_PROCESSED: &str = "streamwire_frames_processed_total";
/// Name of the counter tracking bytes crossing the socket.
pub const BYTES_TRANSFERRED: &str = "streamwire_bytes_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "streamwire_errors_total";
/// Name of the counter tracking requests that waited for admission.
pub const MEMORY_WAITS: &str = "streamwire_memory_waits_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Reply frames read from the peer.
    Inbound,
    /// Request frames written to the peer.
    Outbound,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Category label attached to [`ERRORS_TOTAL`].
#[derive(Clone, Copy, Debug)]
pub enum ErrorKind {
    /// Establishing a connection failed.
    Connect,
    /// An inbound header was corrupt.
    Header,
    /// An inbound frame carried an unknown correlation id.
    ServerCorrelation,
    /// A local correlation id collided.
    ClientCorrelation,
    /// The read loop ended with a fault.
    ReadDispatch,
}

impl ErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Connect => "connect",
            ErrorKind::Header => "header",
            ErrorKind::ServerCorrelation => "server_correlation",
            ErrorKind::ClientCorrelation => "client_correlation",
            ErrorKind::ReadDispatch => "read_dispatch",
        }
    }
}

/// Increment the live connections gauge.
pub fn inc_connections() { gauge!(CONNECTIONS_ACTIVE).increment(1.0); }

/// Decrement the live connections gauge.
pub fn dec_connections() { gauge!(CONNECTIONS_ACTIVE).decrement(1.0); }

/// Record a processed frame for the given direction.
pub fn inc_frames(direction: Direction) {
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
}

/// Record bytes transferred in the given direction.
pub fn add_bytes(direction: Direction, bytes: usize) {
    counter!(BYTES_TRANSFERRED, "direction" => direction.as_str())
        .increment(u64::try_from(bytes).unwrap_or(u64::MAX));
}

/// Record an error occurrence.
pub fn inc_errors(kind: ErrorKind) {
    counter!(ERRORS_TOTAL, "kind" => kind.as_str()).increment(1);
}

/// Record a request that waited for admission.
pub fn inc_memory_waits() { counter!(MEMORY_WAITS).increment(1); }

/// [`Probe`] publishing events to the installed `metrics` recorder.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsProbe;

impl Probe for MetricsProbe {
    fn connection_established(&self) { inc_connections(); }

    fn connection_closed(&self) { dec_connections(); }

    fn connection_error(&self, _error: &ConnectError) { inc_errors(ErrorKind::Connect); }

    fn request_sent(&self) { inc_frames(Direction::Outbound); }

    fn add_bytes_sent(&self, bytes: usize) { add_bytes(Direction::Outbound, bytes); }

    fn add_bytes_received(&self, bytes: usize) { add_bytes(Direction::Inbound, bytes); }

    fn header_corrupted(&self) { inc_errors(ErrorKind::Header); }

    fn server_correlation_error(&self) { inc_errors(ErrorKind::ServerCorrelation); }

    fn client_correlation_error(&self) { inc_errors(ErrorKind::ClientCorrelation); }

    fn waiting_for_available_memory(&self) { inc_memory_waits(); }

    fn read_dispatch_error(&self, _error: &TransportError) {
        inc_errors(ErrorKind::ReadDispatch);
    }

    fn request_completed(&self) { inc_frames(Direction::Inbound); }
}
