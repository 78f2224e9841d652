//! Error types for the multiplexed transport.
//!
//! Errors are split by the stage that produced them: establishing a session
//! ([`ConnectError`]), admitting a request ([`SendError`]), and faults on the
//! live connection ([`TransportError`]). A transport fault is delivered to
//! every affected waiter, so [`TransportError`] is cheap to clone.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

/// Failures raised while establishing a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// A session is already live or another connect is in progress.
    #[error("cannot connect with a valid connection. remote: {addr}")]
    AlreadyConnected {
        /// Configured peer address.
        addr: String,
    },
    /// Background work from the previous session has not drained.
    #[error("previous session still has {in_flight} background task(s) in flight")]
    Draining {
        /// Number of tasks still registered with the dispatch gate.
        in_flight: usize,
    },
    /// `stop()` ran while the session was being established.
    #[error("connection stopped while connecting")]
    Stopped,
    /// The configured address did not resolve to any socket address.
    #[error("failed to resolve {addr}")]
    Resolve {
        /// Configured peer address.
        addr: String,
        /// Underlying resolver failure.
        #[source]
        source: io::Error,
    },
    /// The TCP connection could not be established.
    #[error("failed to connect to {addr}: {source}")]
    Unreachable {
        /// Resolved peer address.
        addr: SocketAddr,
        /// Underlying socket failure.
        #[source]
        source: io::Error,
    },
    /// The TCP connection did not complete within the configured timeout.
    #[error("connecting to {addr} timed out after {timeout:?}")]
    Timeout {
        /// Resolved peer address.
        addr: SocketAddr,
        /// Configured connect timeout.
        timeout: Duration,
    },
    /// Socket options could not be applied before connecting.
    #[error("failed to configure socket: {0}")]
    Socket(#[source] io::Error),
    /// The credential provider failed to supply TLS material.
    #[error("failed to load TLS credentials")]
    Credentials(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The TLS handshake failed.
    #[error("TLS handshake with {addr} failed: {source}")]
    Tls {
        /// Resolved peer address.
        addr: SocketAddr,
        /// Underlying handshake failure.
        #[source]
        source: io::Error,
    },
}

/// Failures raised before a request reaches the wire.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The connection is not in the `Connected` state.
    #[error("cannot send payload with invalid connection. remote: {addr}")]
    NotConnected {
        /// Configured peer address.
        addr: String,
    },
    /// The dispatch gate is closing or closed.
    #[error("dispatch gate is closed")]
    GateClosed,
    /// The connection began stopping while the request was being admitted.
    #[error("connection stopping")]
    Stopping,
    /// The payload cannot be described by the 32-bit frame size field.
    #[error("payload of {len} bytes does not fit in a frame")]
    PayloadTooLarge {
        /// Rejected payload length.
        len: usize,
    },
    /// A correlation id was handed out while still outstanding.
    ///
    /// This indicates id reuse or exhaustion, not a transient fault.
    #[error("invalid client state: doubly registered correlation id {id}")]
    CorrelationCollision {
        /// The colliding correlation id.
        id: u32,
    },
}

impl SendError {
    /// Whether retrying the same request cannot succeed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CorrelationCollision { .. } | Self::PayloadTooLarge { .. }
        )
    }
}

/// Faults on a live connection, delivered to each affected pending request.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    /// Socket read or write failed.
    #[error("socket I/O failed: {0}")]
    Io(#[source] Arc<io::Error>),
    /// A frame header could not be decoded.
    #[error("corrupt frame header: size {size} is out of bounds")]
    CorruptHeader {
        /// The decoded size field.
        size: u32,
    },
    /// The stream ended part way through a frame.
    #[error("stream ended inside a frame with {buffered} byte(s) buffered")]
    Truncated {
        /// Bytes left in the read buffer.
        buffered: usize,
    },
    /// An inbound frame carried a correlation id with no pending request.
    #[error("cannot find correlation id: {id}")]
    UnknownCorrelation {
        /// The unmatched correlation id.
        id: u32,
    },
    /// The peer closed the connection.
    #[error("connection closed by peer")]
    PeerClosed,
    /// The connection is stopping; outstanding requests are abandoned.
    #[error("connection stopping")]
    Stopping,
    /// The writer task exited before the request could be queued.
    #[error("writer task is no longer running")]
    WriterGone,
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self { Self::Io(Arc::new(error)) }
}

impl TransportError {
    /// Whether this error was produced by an orderly `stop()`.
    #[must_use]
    pub fn is_stopping(&self) -> bool { matches!(self, Self::Stopping) }
}

/// Error returned by [`crate::connection::Connection::call`].
#[derive(Clone, Debug, thiserror::Error)]
pub enum RequestError {
    /// The request was rejected before reaching the wire.
    #[error(transparent)]
    Send(#[from] SendError),
    /// The request was sent but failed while awaiting its reply.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
