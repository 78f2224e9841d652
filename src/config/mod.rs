//! Connection configuration.
//!
//! Everything a [`Connection`](crate::connection::Connection) needs is
//! passed in explicitly through [`ConnectionConfig`] at construction time;
//! no component reads process-wide state.

mod socket;

use std::{fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
pub use socket::{DEFAULT_RECV_BUFFER_SIZE, DEFAULT_SEND_BUFFER_SIZE, SocketOptions};

use crate::{credentials::CredentialProvider, frame, tracing_config::TracingConfig};

/// Default admission budget for in-flight request bytes.
pub const DEFAULT_MAX_QUEUED_BYTES: usize = 32 * 1024 * 1024;
/// Default bound on establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const MIN_FRAME_LENGTH: usize = 64;
const MAX_FRAME_LENGTH: usize = 1024 * 1024 * 1024;

/// Settings for one multiplexed connection.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use streamwire::ConnectionConfig;
///
/// let config = ConnectionConfig::new("127.0.0.1:9092")
///     .max_queued_bytes(1024 * 1024)
///     .connect_timeout(Some(Duration::from_secs(2)));
/// assert_eq!(config.server_addr(), "127.0.0.1:9092");
/// assert_eq!(config.max_queued_bytes_value(), 1024 * 1024);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    server_addr: String,
    #[serde(default = "default_max_queued_bytes")]
    max_queued_bytes: usize,
    #[serde(default = "default_max_frame_length")]
    max_frame_length: usize,
    #[serde(default = "default_connect_timeout")]
    connect_timeout: Option<Duration>,
    #[serde(default)]
    socket: SocketOptions,
    #[serde(skip)]
    credentials: Option<Arc<dyn CredentialProvider>>,
    #[serde(skip)]
    tracing: TracingConfig,
}

fn default_max_queued_bytes() -> usize { DEFAULT_MAX_QUEUED_BYTES }

fn default_max_frame_length() -> usize { frame::DEFAULT_MAX_FRAME_LENGTH }

fn default_connect_timeout() -> Option<Duration> { Some(DEFAULT_CONNECT_TIMEOUT) }

impl ConnectionConfig {
    /// Create a plaintext configuration for `server_addr` (`host:port`).
    #[must_use]
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            max_queued_bytes: DEFAULT_MAX_QUEUED_BYTES,
            max_frame_length: frame::DEFAULT_MAX_FRAME_LENGTH,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            socket: SocketOptions::default(),
            credentials: None,
            tracing: TracingConfig::default(),
        }
    }

    /// Bound the bytes of requests awaiting replies.
    #[must_use]
    pub fn max_queued_bytes(mut self, bytes: usize) -> Self {
        self.max_queued_bytes = bytes.max(1);
        self
    }

    /// Bound the size field of inbound frames.
    ///
    /// The value is clamped between 64 bytes and 1 GiB.
    #[must_use]
    pub fn max_frame_length(mut self, bytes: usize) -> Self {
        self.max_frame_length = bytes.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH);
        self
    }

    /// Bound the TCP connect; `None` waits for the OS timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Replace the socket options.
    #[must_use]
    pub fn socket_options(mut self, options: SocketOptions) -> Self {
        self.socket = options;
        self
    }

    /// Wrap sessions in TLS using material from `provider`.
    #[must_use]
    pub fn credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Replace the tracing configuration.
    #[must_use]
    pub fn tracing(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }

    /// Peer address as configured.
    #[must_use]
    pub fn server_addr(&self) -> &str { &self.server_addr }

    /// Admission budget in bytes.
    #[must_use]
    pub const fn max_queued_bytes_value(&self) -> usize { self.max_queued_bytes }

    /// Maximum inbound size field.
    #[must_use]
    pub const fn max_frame_length_value(&self) -> usize { self.max_frame_length }

    /// Connect timeout, if any.
    #[must_use]
    pub const fn connect_timeout_value(&self) -> Option<Duration> { self.connect_timeout }

    /// Socket options applied on connect.
    #[must_use]
    pub const fn socket_options_value(&self) -> &SocketOptions { &self.socket }

    /// Configured credential provider, if any.
    #[must_use]
    pub fn credentials_value(&self) -> Option<&Arc<dyn CredentialProvider>> {
        self.credentials.as_ref()
    }

    /// Tracing configuration.
    #[must_use]
    pub const fn tracing_value(&self) -> &TracingConfig { &self.tracing }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("server_addr", &self.server_addr)
            .field("max_queued_bytes", &self.max_queued_bytes)
            .field("max_frame_length", &self.max_frame_length)
            .field("connect_timeout", &self.connect_timeout)
            .field("socket", &self.socket)
            .field("tls", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}
