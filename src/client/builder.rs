//! Builder for [`RpcClient`].

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use super::RpcClient;
use crate::{
    config::ConnectionConfig,
    connection::Connection,
    gate::DispatchGate,
    probe::{NoopProbe, Probe},
    retry::{RetryPolicy, WaitOrStart},
    serializer::{BincodeSerializer, Serializer},
};

/// Builder for [`RpcClient`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use streamwire::{ConnectionConfig, RpcClient, probe::CountingProbe, retry::RetryPolicy};
///
/// let client = RpcClient::builder(ConnectionConfig::new("127.0.0.1:9092"))
///     .retry_policy(RetryPolicy::no_retry())
///     .probe(Arc::new(CountingProbe::default()))
///     .build();
/// # let _ = client;
/// ```
pub struct RpcClientBuilder<S = BincodeSerializer> {
    config: ConnectionConfig,
    policy: RetryPolicy,
    serializer: S,
    probe: Arc<dyn Probe>,
}

impl RpcClientBuilder<BincodeSerializer> {
    /// Start a builder with the bincode serializer and default retry policy.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            policy: RetryPolicy::default(),
            serializer: BincodeSerializer,
            probe: Arc::new(NoopProbe),
        }
    }
}

impl<S> RpcClientBuilder<S>
where
    S: Serializer + Send + Sync,
{
    /// Replace the body serializer.
    #[must_use]
    pub fn serializer<Ser>(self, serializer: Ser) -> RpcClientBuilder<Ser>
    where
        Ser: Serializer + Send + Sync,
    {
        RpcClientBuilder {
            config: self.config,
            policy: self.policy,
            serializer,
            probe: self.probe,
        }
    }

    /// Replace the retry policy applied to every call.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy.normalized();
        self
    }

    /// Observe connection events with `probe`.
    #[must_use]
    pub fn probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = probe;
        self
    }

    /// Build a disconnected client.
    #[must_use]
    pub fn build(self) -> RpcClient<S> {
        RpcClient {
            connection: Connection::new(self.config, self.probe),
            serializer: self.serializer,
            policy: self.policy,
            gate: DispatchGate::new(),
            reconnect: WaitOrStart::new(),
            shutdown: Mutex::new(CancellationToken::new()),
        }
    }
}
