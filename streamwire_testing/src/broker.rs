//! Scripted broker for driving a [`Connection`](streamwire::Connection)
//! over real TCP in tests.
//!
//! [`TestBroker`] binds an ephemeral local port. Tests either accept a
//! [`BrokerSession`] and script every frame by hand, or hand the broker to
//! [`TestBroker::spawn_echo`] to answer every request with its own payload.

use std::{net::SocketAddr, time::Duration};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use streamwire::{ConnectionConfig, Frame, FrameCodec};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::codec::Framed;

/// Upper bound on any single scripted step.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(2);

/// Listening broker stand-in.
pub struct TestBroker {
    listener: TcpListener,
    addr: SocketAddr,
}

impl TestBroker {
    /// Bind to an ephemeral port on the loopback interface.
    ///
    /// # Panics
    ///
    /// Panics if the port cannot be bound.
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test broker");
        let addr = listener.local_addr().expect("test broker address");
        Self { listener, addr }
    }

    /// Address clients should dial.
    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Plaintext configuration pointing at this broker.
    #[must_use]
    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.addr.to_string()).connect_timeout(Some(STEP_TIMEOUT))
    }

    /// Wait for the next client session.
    ///
    /// # Panics
    ///
    /// Panics if no client connects within [`STEP_TIMEOUT`].
    pub async fn accept(&self) -> BrokerSession {
        let (stream, _) = timeout(STEP_TIMEOUT, self.listener.accept())
            .await
            .expect("client connected in time")
            .expect("accept client");
        BrokerSession {
            framed: Framed::new(stream, FrameCodec::default()),
        }
    }

    /// Answer every request on every session with its own payload.
    #[must_use]
    pub fn spawn_echo(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Ok((stream, _)) = self.listener.accept().await {
                tokio::spawn(echo(Framed::new(stream, FrameCodec::default())));
            }
        })
    }
}

async fn echo(mut framed: Framed<TcpStream, FrameCodec>) {
    while let Some(Ok(frame)) = framed.next().await {
        if framed.send(frame).await.is_err() {
            break;
        }
    }
}

/// Broker side of one accepted session.
pub struct BrokerSession {
    framed: Framed<TcpStream, FrameCodec>,
}

impl BrokerSession {
    /// Read the next request frame.
    ///
    /// # Panics
    ///
    /// Panics if no well-formed frame arrives within [`STEP_TIMEOUT`].
    pub async fn recv(&mut self) -> Frame {
        timeout(STEP_TIMEOUT, self.framed.next())
            .await
            .expect("request arrived in time")
            .expect("session still open")
            .expect("well-formed request")
    }

    /// Read the next `count` request frames in arrival order.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`recv`](Self::recv).
    pub async fn recv_many(&mut self, count: usize) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            frames.push(self.recv().await);
        }
        frames
    }

    /// Send a reply frame for `correlation_id`.
    ///
    /// # Panics
    ///
    /// Panics if the write fails.
    pub async fn reply(&mut self, correlation_id: u32, payload: impl Into<Bytes>) {
        self.framed
            .send(Frame::new(correlation_id, payload))
            .await
            .expect("write reply");
    }

    /// Write raw bytes, bypassing the frame encoder.
    ///
    /// # Panics
    ///
    /// Panics if the write fails.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        let stream = self.framed.get_mut();
        stream.write_all(bytes).await.expect("write raw bytes");
        stream.flush().await.expect("flush raw bytes");
    }

    /// Assert the client closes its side of the session.
    ///
    /// # Panics
    ///
    /// Panics if a frame arrives or the session stays open past
    /// [`STEP_TIMEOUT`].
    pub async fn expect_closed(&mut self) {
        let next = timeout(STEP_TIMEOUT, self.framed.next())
            .await
            .expect("session closed in time");
        assert!(
            !matches!(next, Some(Ok(_))),
            "unexpected frame after close: {next:?}"
        );
    }
}
