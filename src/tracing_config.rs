//! Tracing configuration for transport operations.
//!
//! [`TracingConfig`] controls the level of the spans emitted around
//! `connect`, `send`, `call`, and `stop`, and whether `call` records its
//! elapsed time.

use tracing::Level;

/// Span levels and per-call timing for transport operations.
///
/// Lifecycle operations (`connect`, `stop`) default to `INFO`; per-request
/// operations (`send`, `call`) default to `DEBUG`. When no subscriber is
/// installed span creation is a no-op.
///
/// # Examples
///
/// ```
/// use streamwire::TracingConfig;
/// use tracing::Level;
///
/// let config = TracingConfig::default()
///     .with_call_level(Level::TRACE)
///     .with_call_timing(true);
/// let _ = config;
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TracingConfig {
    pub(crate) connect_level: Level,
    pub(crate) send_level: Level,
    pub(crate) call_level: Level,
    pub(crate) stop_level: Level,
    pub(crate) call_timing: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            connect_level: Level::INFO,
            send_level: Level::DEBUG,
            call_level: Level::DEBUG,
            stop_level: Level::INFO,
            call_timing: false,
        }
    }
}

impl TracingConfig {
    /// Set the level of the `connect` span.
    #[must_use]
    pub fn with_connect_level(mut self, level: Level) -> Self {
        self.connect_level = level;
        self
    }

    /// Set the level of the `send` span.
    #[must_use]
    pub fn with_send_level(mut self, level: Level) -> Self {
        self.send_level = level;
        self
    }

    /// Set the level of the `call` span.
    #[must_use]
    pub fn with_call_level(mut self, level: Level) -> Self {
        self.call_level = level;
        self
    }

    /// Set the level of the `stop` span.
    #[must_use]
    pub fn with_stop_level(mut self, level: Level) -> Self {
        self.stop_level = level;
        self
    }

    /// Emit an `elapsed_us` event when a `call` completes.
    #[must_use]
    pub fn with_call_timing(mut self, enabled: bool) -> Self {
        self.call_timing = enabled;
        self
    }
}
