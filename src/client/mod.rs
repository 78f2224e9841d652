//! Retrying RPC client over a single multiplexed [`Connection`].
//!
//! [`RpcClient`] serializes typed request bodies, sends them through the
//! connection, and decodes the replies. Every call runs under the client's
//! [`RetryPolicy`]; when an attempt fails because the session is gone, the
//! client reconnects before the next attempt, with concurrent callers
//! sharing a single reconnect.

mod builder;
mod error;

use std::sync::{Mutex, PoisonError};

pub use builder::RpcClientBuilder;
use bytes::Bytes;
pub use error::ClientError;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    config::ConnectionConfig,
    connection::{Connection, ConnectionState},
    error::ConnectError,
    gate::{DispatchGate, GateBusy},
    message::Message,
    retry::{RetryPolicy, WaitOrStart, retry_with_mitigation},
    serializer::{BincodeSerializer, Serializer},
    tracing_helpers::{call_span, call_timer, emit_call_timing},
};

/// RPC client with retries and automatic reconnection.
///
/// # Panics
///
/// Like [`Connection`], dropping a client whose connection is live panics;
/// await [`stop`](Self::stop) first.
///
/// # Examples
///
/// ```no_run
/// use streamwire::{ConnectionConfig, RpcClient, retry::RetryPolicy};
///
/// #[derive(bincode::Encode, bincode::BorrowDecode)]
/// struct MetadataRequest {
///     topics: Vec<String>,
/// }
///
/// #[derive(bincode::Encode, bincode::BorrowDecode)]
/// struct MetadataResponse {
///     brokers: Vec<String>,
/// }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), streamwire::ClientError> {
/// let client = RpcClient::new(ConnectionConfig::new("127.0.0.1:9092"), RetryPolicy::default());
/// client.connect().await?;
/// let reply: MetadataResponse = client
///     .call(&MetadataRequest {
///         topics: vec!["orders".into()],
///     })
///     .await?;
/// # let _ = reply.brokers;
/// client.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct RpcClient<S = BincodeSerializer> {
    connection: Connection,
    serializer: S,
    policy: RetryPolicy,
    gate: DispatchGate,
    reconnect: WaitOrStart,
    shutdown: Mutex<CancellationToken>,
}

impl<S> std::fmt::Debug for RpcClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("connection", &self.connection)
            .field("policy", &self.policy)
            .field("in_flight_calls", &self.gate.in_flight())
            .finish_non_exhaustive()
    }
}

impl RpcClient<BincodeSerializer> {
    /// Create a disconnected client using the bincode serializer.
    #[must_use]
    pub fn new(config: ConnectionConfig, policy: RetryPolicy) -> Self {
        Self::builder(config).retry_policy(policy).build()
    }

    /// Start building a client for `config`.
    #[must_use]
    pub fn builder(config: ConnectionConfig) -> RpcClientBuilder<BincodeSerializer> {
        RpcClientBuilder::new(config)
    }
}

impl<S> RpcClient<S>
where
    S: Serializer + Send + Sync,
{
    /// Establish the session, reopening the client after a previous `stop`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] if the session cannot be
    /// established or calls from before the last `stop` are still running.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.gate.is_closed() {
            *self.shutdown.lock().unwrap_or_else(PoisonError::into_inner) =
                CancellationToken::new();
            self.gate
                .reopen()
                .map_err(|GateBusy { in_flight }| ConnectError::Draining { in_flight })?;
        }
        self.connection.connect().await?;
        Ok(())
    }

    /// Refuse new calls, stop the connection, and wait for calls in flight.
    ///
    /// Calls in flight, including those sleeping between attempts, fail
    /// promptly with [`ClientError::ShuttingDown`] and are not retried.
    pub async fn stop(&self) {
        self.gate.seal();
        self.shutdown_token().cancel();
        self.connection.stop().await;
        self.gate.close().await;
        // A reconnect that raced the first stop may have left a session.
        self.connection.stop().await;
    }

    /// Serialize `request`, send it, and decode the reply as `Resp`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Serialize`] or [`ClientError::Deserialize`] for
    /// body encoding failures, [`ClientError::ShuttingDown`] once `stop` has
    /// begun, and the last connection or request error once the retry policy
    /// is exhausted.
    pub async fn call<Req, Resp>(&self, request: &Req) -> Result<Resp, ClientError>
    where
        Req: Message,
        Resp: Message,
    {
        let payload = self
            .serializer
            .serialize(request)
            .map_err(ClientError::Serialize)?;
        let reply = self.call_raw(Bytes::from(payload)).await?;
        let (response, _) = self
            .serializer
            .deserialize(&reply)
            .map_err(ClientError::Deserialize)?;
        Ok(response)
    }

    /// Send an already encoded payload and return the raw reply bytes.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn call_raw(&self, payload: Bytes) -> Result<Bytes, ClientError> {
        let _entry = self.gate.enter().map_err(|_| ClientError::ShuttingDown)?;
        let shutdown = self.shutdown_token();
        let tracing = self.connection.config().tracing_value();
        let span = call_span(tracing);
        let start = call_timer(tracing);
        let mut attempts = 0_u32;
        let result = async {
            let retried = retry_with_mitigation(
                &self.policy,
                || {
                    attempts += 1;
                    self.attempt(payload.clone())
                },
                |_error| self.mitigate(),
            );
            tokio::select! {
                biased;
                () = shutdown.cancelled() => Err(ClientError::ShuttingDown),
                result = retried => result,
            }
        }
        .instrument(span.clone())
        .await;
        span.record("attempts", attempts);
        span.record("result", if result.is_ok() { "ok" } else { "error" });
        let _entered = span.enter();
        emit_call_timing(tracing, start);
        result
    }

    /// The underlying connection.
    #[must_use]
    pub fn connection(&self) -> &Connection { &self.connection }

    /// Retry policy applied to every call.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy { &self.policy }

    fn shutdown_token(&self) -> CancellationToken {
        self.shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn attempt(&self, payload: Bytes) -> Result<Bytes, ClientError> {
        if self.gate.is_closed() {
            return Err(ClientError::ShuttingDown);
        }
        Ok(self.connection.call(payload).await?)
    }

    /// Reconnect if the session is gone, sharing the reconnect with any
    /// concurrent caller.
    async fn mitigate(&self) {
        if self.gate.is_closed() || self.connection.state() == ConnectionState::Connected {
            return;
        }
        let ran = self
            .reconnect
            .run(move || async move {
                if self.gate.is_closed()
                    || self.connection.state() == ConnectionState::Connected
                {
                    return;
                }
                match self.connection.connect().await {
                    Ok(()) => debug!("reconnected after failed call"),
                    Err(error) => warn!("reconnect failed: {error}"),
                }
            })
            .await;
        if !ran {
            debug!("waited for concurrent reconnect");
        }
    }
}

#[cfg(test)]
mod tests;
