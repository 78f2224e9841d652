//! Observational hooks for connection lifecycle events.
//!
//! A [`Probe`] receives notifications from the connection, the correlation
//! table, and the admission controller. Probes never influence behaviour;
//! every method has an empty default so implementations only override what
//! they record.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::error::{ConnectError, TransportError};

/// Receiver of transport lifecycle events.
pub trait Probe: Send + Sync {
    /// A session finished connecting.
    fn connection_established(&self) {}
    /// The read loop of a session exited.
    fn connection_closed(&self) {}
    /// Establishing a session failed.
    fn connection_error(&self, _error: &ConnectError) {}
    /// A request frame was written to the socket.
    fn request_sent(&self) {}
    /// Bytes written to the socket.
    fn add_bytes_sent(&self, _bytes: usize) {}
    /// Bytes read from the socket, header included.
    fn add_bytes_received(&self, _bytes: usize) {}
    /// An inbound header failed to decode.
    fn header_corrupted(&self) {}
    /// An inbound frame named a correlation id with no pending request.
    fn server_correlation_error(&self) {}
    /// A locally issued correlation id was still outstanding.
    fn client_correlation_error(&self) {}
    /// A request had to wait for admission.
    fn waiting_for_available_memory(&self) {}
    /// The read loop terminated with a fault.
    fn read_dispatch_error(&self, _error: &TransportError) {}
    /// A reply was delivered to its waiter.
    fn request_completed(&self) {}
}

/// Probe that discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProbe;

impl Probe for NoopProbe {}

/// Probe keeping in-memory counters of every event.
///
/// # Examples
///
/// ```
/// use streamwire::probe::{CountingProbe, Probe};
///
/// let probe = CountingProbe::default();
/// probe.add_bytes_sent(12);
/// probe.request_sent();
/// let snapshot = probe.snapshot();
/// assert_eq!(snapshot.bytes_sent, 12);
/// assert_eq!(snapshot.requests_sent, 1);
/// ```
#[derive(Debug, Default)]
pub struct CountingProbe {
    connects: AtomicU64,
    disconnects: AtomicU64,
    connection_errors: AtomicU64,
    requests_sent: AtomicU64,
    requests_completed: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    corrupted_headers: AtomicU64,
    server_correlation_errors: AtomicU64,
    client_correlation_errors: AtomicU64,
    memory_waits: AtomicU64,
    read_dispatch_errors: AtomicU64,
}

/// Point-in-time copy of a [`CountingProbe`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProbeSnapshot {
    /// Sessions established.
    pub connects: u64,
    /// Read loops exited.
    pub disconnects: u64,
    /// Failed connection attempts.
    pub connection_errors: u64,
    /// Request frames written.
    pub requests_sent: u64,
    /// Replies delivered.
    pub requests_completed: u64,
    /// Bytes written.
    pub bytes_sent: u64,
    /// Bytes read.
    pub bytes_received: u64,
    /// Undecodable headers.
    pub corrupted_headers: u64,
    /// Inbound frames with unknown correlation ids.
    pub server_correlation_errors: u64,
    /// Local correlation id collisions.
    pub client_correlation_errors: u64,
    /// Requests that waited for admission.
    pub memory_waits: u64,
    /// Read loops that ended with a fault.
    pub read_dispatch_errors: u64,
}

impl CountingProbe {
    /// Capture the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> ProbeSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        ProbeSnapshot {
            connects: load(&self.connects),
            disconnects: load(&self.disconnects),
            connection_errors: load(&self.connection_errors),
            requests_sent: load(&self.requests_sent),
            requests_completed: load(&self.requests_completed),
            bytes_sent: load(&self.bytes_sent),
            bytes_received: load(&self.bytes_received),
            corrupted_headers: load(&self.corrupted_headers),
            server_correlation_errors: load(&self.server_correlation_errors),
            client_correlation_errors: load(&self.client_correlation_errors),
            memory_waits: load(&self.memory_waits),
            read_dispatch_errors: load(&self.read_dispatch_errors),
        }
    }
}

fn bump(counter: &AtomicU64, by: usize) {
    counter.fetch_add(u64::try_from(by).unwrap_or(u64::MAX), Ordering::Relaxed);
}

impl Probe for CountingProbe {
    fn connection_established(&self) { bump(&self.connects, 1); }

    fn connection_closed(&self) { bump(&self.disconnects, 1); }

    fn connection_error(&self, _error: &ConnectError) { bump(&self.connection_errors, 1); }

    fn request_sent(&self) { bump(&self.requests_sent, 1); }

    fn add_bytes_sent(&self, bytes: usize) { bump(&self.bytes_sent, bytes); }

    fn add_bytes_received(&self, bytes: usize) { bump(&self.bytes_received, bytes); }

    fn header_corrupted(&self) { bump(&self.corrupted_headers, 1); }

    fn server_correlation_error(&self) { bump(&self.server_correlation_errors, 1); }

    fn client_correlation_error(&self) { bump(&self.client_correlation_errors, 1); }

    fn waiting_for_available_memory(&self) { bump(&self.memory_waits, 1); }

    fn read_dispatch_error(&self, _error: &TransportError) {
        bump(&self.read_dispatch_errors, 1);
    }

    fn request_completed(&self) { bump(&self.requests_completed, 1); }
}

impl fmt::Display for ProbeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connects={} disconnects={} connection_errors={} requests_sent={} \
             requests_completed={} bytes_sent={} bytes_received={} corrupted_headers={} \
             server_correlation_errors={} client_correlation_errors={} memory_waits={} \
             read_dispatch_errors={}",
            self.connects,
            self.disconnects,
            self.connection_errors,
            self.requests_sent,
            self.requests_completed,
            self.bytes_sent,
            self.bytes_received,
            self.corrupted_headers,
            self.server_correlation_errors,
            self.client_correlation_errors,
            self.memory_waits,
            self.read_dispatch_errors,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_summary_lists_every_counter() {
        let probe = CountingProbe::default();
        probe.connection_established();
        probe.request_sent();
        probe.add_bytes_sent(16);

        let summary = probe.snapshot().to_string();
        assert!(summary.starts_with("connects=1 disconnects=0"), "{summary}");
        assert!(summary.contains("requests_sent=1"), "{summary}");
        assert!(summary.contains("bytes_sent=16"), "{summary}");
        assert!(summary.ends_with("read_dispatch_errors=0"), "{summary}");
    }
}
