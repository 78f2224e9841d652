//! Multiplexed request/reply connection to a single broker.
//!
//! A [`Connection`] owns one TCP (optionally TLS) session at a time. Requests
//! are tagged with a correlation id, registered in the
//! [`CorrelationTable`], and queued to a single writer task; a single read
//! loop routes each reply back to its waiter by id, in whatever order the
//! peer answers. Both background tasks run inside the connection's
//! [`DispatchGate`] so `stop()` can wait for them to finish.

mod read_loop;
mod state;
mod stream;
mod writer;

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
};

use bytes::Bytes;
use log::{debug, error, info, warn};
pub use state::ConnectionState;
pub use stream::ClientStream;
use stream::BoxedStream;
use tokio::sync::mpsc;
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};
use tracing::Instrument;

use crate::{
    admission::MemoryAdmission,
    config::ConnectionConfig,
    correlation::{CorrelationTable, ResponseFuture},
    error::{ConnectError, RequestError, SendError, TransportError},
    frame::{Frame, FrameCodec, FrameHeader},
    gate::{DispatchGate, GateBusy},
    probe::Probe,
    tracing_helpers::{connect_span, send_span, stop_span},
};

struct Session {
    queue: mpsc::UnboundedSender<Frame>,
    cancel: CancellationToken,
    peer: SocketAddr,
}

struct Lifecycle {
    state: ConnectionState,
    session: Option<Session>,
    /// Bumped by every connect and stop; a dial may only install its
    /// session while the generation it started under is current.
    generation: u64,
}

/// State shared between the [`Connection`] handle and its background tasks.
struct Shared {
    config: ConnectionConfig,
    probe: Arc<dyn Probe>,
    lifecycle: Mutex<Lifecycle>,
    table: CorrelationTable,
    admission: MemoryAdmission,
    gate: DispatchGate,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_connect(&self) -> Result<u64, ConnectError> {
        let mut lifecycle = self.lock();
        if lifecycle.state.is_live() {
            return Err(ConnectError::AlreadyConnected {
                addr: self.config.server_addr().to_owned(),
            });
        }
        self.gate
            .reopen()
            .map_err(|GateBusy { in_flight }| ConnectError::Draining { in_flight })?;
        self.table.reopen();
        lifecycle.state = ConnectionState::Connecting;
        lifecycle.session = None;
        lifecycle.generation += 1;
        Ok(lifecycle.generation)
    }

    fn start_session(
        self: &Arc<Self>,
        stream: BoxedStream,
        peer: SocketAddr,
        generation: u64,
    ) -> Result<(), ConnectError> {
        let mut lifecycle = self.lock();
        if lifecycle.generation != generation || lifecycle.state != ConnectionState::Connecting {
            return Err(ConnectError::Stopped);
        }
        let codec = FrameCodec::new(self.config.max_frame_length_value());
        let (reader, writer) = tokio::io::split(stream);
        let (queue, queued) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        self.gate
            .spawn(read_loop::run(
                Arc::clone(self),
                FramedRead::new(reader, codec),
                cancel.clone(),
            ))
            .map_err(|_| ConnectError::Stopped)?;
        if self
            .gate
            .spawn(writer::run(
                Arc::clone(self),
                FramedWrite::new(writer, codec),
                queued,
                cancel.clone(),
            ))
            .is_err()
        {
            cancel.cancel();
            return Err(ConnectError::Stopped);
        }

        lifecycle.session = Some(Session {
            queue,
            cancel,
            peer,
        });
        lifecycle.state = ConnectionState::Connected;
        Ok(())
    }

    fn abort_connect(&self, generation: u64) {
        let mut lifecycle = self.lock();
        if lifecycle.generation == generation && lifecycle.state == ConnectionState::Connecting {
            lifecycle.state = ConnectionState::Closed;
        }
    }

    fn live_queue(&self) -> Result<mpsc::UnboundedSender<Frame>, SendError> {
        let lifecycle = self.lock();
        match (&lifecycle.state, &lifecycle.session) {
            (ConnectionState::Connected, Some(session)) => Ok(session.queue.clone()),
            _ => Err(SendError::NotConnected {
                addr: self.config.server_addr().to_owned(),
            }),
        }
    }

    fn begin_stop(&self) -> Option<Session> {
        let mut lifecycle = self.lock();
        if matches!(
            lifecycle.state,
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            lifecycle.state = ConnectionState::Closing;
        }
        lifecycle.generation += 1;
        lifecycle.session.take()
    }

    fn finish_stop(&self) {
        let mut lifecycle = self.lock();
        if lifecycle.state == ConnectionState::Closing {
            lifecycle.state = ConnectionState::Closed;
        }
    }

    /// Tear down a live session after a transport fault.
    ///
    /// Faults observed after cancellation belong to an orderly stop and are
    /// only logged.
    fn fault(&self, error: &TransportError, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            debug!("session ended during shutdown: {error}");
            return;
        }
        warn!(
            "connection to {} failed: {error}",
            self.config.server_addr()
        );
        self.probe.read_dispatch_error(error);
        {
            let mut lifecycle = self.lock();
            if lifecycle.state == ConnectionState::Connected {
                lifecycle.state = ConnectionState::Closed;
            }
        }
        let failed = self.table.fail_all(error);
        cancel.cancel();
        debug!("session closed after fault: failed_requests={failed}");
    }
}

/// Reject payloads the size field cannot describe before they take up
/// admission or a correlation id.
fn frame_fits(len: usize) -> Result<(), SendError> {
    FrameHeader::for_payload(0, len)
        .map(|_| ())
        .map_err(|_| SendError::PayloadTooLarge { len })
}

/// Handle to a multiplexed broker connection.
///
/// # Panics
///
/// Dropping a `Connection` while it is [`Connected`](ConnectionState::Connected)
/// panics: await [`stop`](Self::stop) first so outstanding requests are
/// failed and the background tasks are drained.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use bytes::Bytes;
/// use streamwire::{ConnectionConfig, connection::Connection, probe::NoopProbe};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let connection = Connection::new(ConnectionConfig::new("127.0.0.1:9092"), Arc::new(NoopProbe));
/// connection.connect().await?;
/// let reply = connection.call(Bytes::from_static(b"ping")).await?;
/// # let _ = reply;
/// connection.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct Connection {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("server_addr", &self.shared.config.server_addr())
            .field("state", &self.state())
            .field("pending", &self.pending_requests())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a disconnected connection.
    #[must_use]
    pub fn new(config: ConnectionConfig, probe: Arc<dyn Probe>) -> Self {
        let table = CorrelationTable::new(Arc::clone(&probe));
        let admission = MemoryAdmission::new(config.max_queued_bytes_value(), Arc::clone(&probe));
        Self {
            shared: Arc::new(Shared {
                config,
                probe,
                lifecycle: Mutex::new(Lifecycle {
                    state: ConnectionState::Disconnected,
                    session: None,
                    generation: 0,
                }),
                table,
                admission,
                gate: DispatchGate::new(),
            }),
        }
    }

    /// Stop any previous session and establish a new one.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::AlreadyConnected`] if another task connected
    /// concurrently, [`ConnectError::Draining`] if background work from the
    /// previous session is still running, or the dial, timeout, credential,
    /// or TLS failure that prevented the session.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let span = connect_span(
            self.shared.config.tracing_value(),
            self.shared.config.server_addr(),
        );
        async {
            self.stop().await;
            self.do_connect().await
        }
        .instrument(span)
        .await
    }

    async fn do_connect(&self) -> Result<(), ConnectError> {
        let shared = &self.shared;
        let generation = match shared.begin_connect() {
            Ok(generation) => generation,
            Err(error) => {
                shared.probe.connection_error(&error);
                return Err(error);
            }
        };
        let established = match stream::dial(&shared.config).await {
            Ok((stream, peer)) => shared
                .start_session(stream, peer, generation)
                .map(|()| peer),
            Err(error) => Err(error),
        };
        match established {
            Ok(peer) => {
                info!("connected: peer={peer}");
                shared.probe.connection_established();
                Ok(())
            }
            Err(error) => {
                shared.abort_connect(generation);
                warn!(
                    "failed to connect to {}: {error}",
                    shared.config.server_addr()
                );
                shared.probe.connection_error(&error);
                Err(error)
            }
        }
    }

    /// Queue `payload` as a request and return a future for its reply.
    ///
    /// The request is registered before its bytes are queued, so a reply can
    /// never overtake its own registration. Waits in FIFO order while the
    /// connection's `max_queued_bytes` budget is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NotConnected`] when there is no live session,
    /// [`SendError::GateClosed`] or [`SendError::Stopping`] when `stop()`
    /// races the request, [`SendError::PayloadTooLarge`] if the payload
    /// cannot be framed, and [`SendError::CorrelationCollision`] if the next
    /// correlation id is still outstanding.
    pub async fn send(&self, payload: Bytes) -> Result<ResponseFuture, SendError> {
        let shared = &self.shared;
        let span = send_span(shared.config.tracing_value(), payload.len());
        async {
            let queue = shared.live_queue()?;
            frame_fits(payload.len())?;
            let _entry = shared.gate.enter().map_err(|_| SendError::GateClosed)?;
            let admission = shared.admission.reserve(payload.len()).await?;
            let id = shared.table.reserve_id()?;
            tracing::Span::current().record("correlation_id", id);
            let response = shared.table.register(id, Some(admission))?;
            if queue.send(Frame::new(id, payload)).is_err() {
                shared.table.fail(id, TransportError::WriterGone);
            }
            Ok::<_, SendError>(response)
        }
        .instrument(span)
        .await
    }

    /// Send `payload` and wait for its reply.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Send`] if the request was not admitted and
    /// [`RequestError::Transport`] if the session failed before the reply
    /// arrived.
    pub async fn call(&self, payload: Bytes) -> Result<Bytes, RequestError> {
        let response = self.send(payload).await?;
        Ok(response.await?)
    }

    /// Tear the session down and wait for its background work to finish.
    ///
    /// Every outstanding request fails with [`TransportError::Stopping`].
    /// Calling `stop` on a connection that is not connected, or more than
    /// once, is harmless. Teardown failures are logged, not returned.
    pub async fn stop(&self) {
        let shared = &self.shared;
        let span = stop_span(shared.config.tracing_value(), shared.config.server_addr());
        async {
            let session = shared.begin_stop();
            shared.gate.seal();
            if let Some(session) = &session {
                session.cancel.cancel();
            }
            let failed = shared.table.fail_all(&TransportError::Stopping);
            shared.gate.close().await;
            shared.finish_stop();
            if let Some(session) = session {
                info!(
                    "connection stopped: peer={}, failed_requests={failed}",
                    session.peer
                );
            }
        }
        .instrument(span)
        .await;
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.shared.lock().state }

    /// Background tasks and in-progress sends registered with the gate.
    #[must_use]
    pub fn in_flight_tasks(&self) -> usize { self.shared.gate.in_flight() }

    /// Requests awaiting a reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize { self.shared.table.len() }

    /// Payload bytes currently held by admission.
    #[must_use]
    pub fn reserved_bytes(&self) -> usize { self.shared.admission.reserved() }

    /// Peer of the current session, or of the last one to fault.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.lock().session.as_ref().map(|session| session.peer)
    }

    /// Configuration the connection was created with.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig { &self.shared.config }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.state() != ConnectionState::Connected {
            return;
        }
        let addr = self.shared.config.server_addr();
        error!("connection to {addr} dropped while connected; stop() was not awaited");
        if !thread::panicking() {
            panic!("connection to {addr} dropped while connected");
        }
    }
}
