//! Connection lifecycle state.

use std::fmt;

/// Lifecycle state of a [`Connection`](super::Connection).
///
/// `Disconnected` is the initial state. A successful connect moves through
/// `Connecting` to `Connected`; `stop()` moves through `Closing` to `Closed`.
/// A transport fault on a live session moves straight to `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session has been attempted yet.
    Disconnected,
    /// A session is being established.
    Connecting,
    /// The session is live and accepts requests.
    Connected,
    /// `stop()` is tearing the session down.
    Closing,
    /// The last session has ended.
    Closed,
}

impl ConnectionState {
    /// Whether `connect()` would be refused in this state.
    pub(super) fn is_live(self) -> bool { matches!(self, Self::Connecting | Self::Connected) }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
