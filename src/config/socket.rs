//! Socket options applied before a connection is established.

use std::{io, time::Duration};

use serde::{Deserialize, Serialize};
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpSocket;

/// Default `SO_SNDBUF`, matching the Kafka client's `send.buffer.bytes`.
pub const DEFAULT_SEND_BUFFER_SIZE: u32 = 128 * 1024;
/// Default `SO_RCVBUF`, matching the Kafka client's `receive.buffer.bytes`.
pub const DEFAULT_RECV_BUFFER_SIZE: u32 = 64 * 1024;

/// Socket options applied to every connection attempt.
///
/// `TCP_NODELAY` is enabled by default: requests are already batched by the
/// writer task, so Nagle's algorithm only adds latency.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use streamwire::config::SocketOptions;
///
/// let options = SocketOptions::default()
///     .nodelay(false)
///     .keepalive(Some(Duration::from_secs(30)));
/// assert!(!options.nodelay_value());
/// assert_eq!(options.keepalive_value(), Some(Duration::from_secs(30)));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketOptions {
    nodelay: bool,
    keepalive: Option<Duration>,
    send_buffer_size: Option<u32>,
    recv_buffer_size: Option<u32>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: None,
            send_buffer_size: Some(DEFAULT_SEND_BUFFER_SIZE),
            recv_buffer_size: Some(DEFAULT_RECV_BUFFER_SIZE),
        }
    }
}

impl SocketOptions {
    /// Configure `TCP_NODELAY`.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    /// Enable `SO_KEEPALIVE` with the given idle time, or leave it off.
    #[must_use]
    pub fn keepalive(mut self, idle: Option<Duration>) -> Self {
        self.keepalive = idle;
        self
    }

    /// Configure `SO_SNDBUF`; `None` keeps the OS default.
    #[must_use]
    pub fn send_buffer_size(mut self, size: Option<u32>) -> Self {
        self.send_buffer_size = size;
        self
    }

    /// Configure `SO_RCVBUF`; `None` keeps the OS default.
    #[must_use]
    pub fn recv_buffer_size(mut self, size: Option<u32>) -> Self {
        self.recv_buffer_size = size;
        self
    }

    /// Whether `TCP_NODELAY` is requested.
    #[must_use]
    pub const fn nodelay_value(&self) -> bool { self.nodelay }

    /// Requested keepalive idle time.
    #[must_use]
    pub const fn keepalive_value(&self) -> Option<Duration> { self.keepalive }

    pub(crate) fn apply(&self, socket: &TcpSocket) -> io::Result<()> {
        socket.set_nodelay(self.nodelay)?;
        self.apply_keepalive(socket)?;
        if let Some(size) = self.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        if let Some(size) = self.recv_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }
        Ok(())
    }

    fn apply_keepalive(&self, socket: &TcpSocket) -> io::Result<()> {
        match self.keepalive {
            Some(idle) => {
                socket.set_keepalive(true)?;
                let config = TcpKeepalive::new().with_time(idle);
                SockRef::from(socket).set_tcp_keepalive(&config)
            }
            None => socket.set_keepalive(false),
        }
    }
}
