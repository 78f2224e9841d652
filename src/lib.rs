#![doc(html_root_url = "https://docs.rs/streamwire/latest")]
//! Public API for the `streamwire` library.
//!
//! This crate provides the client side of a Kafka-compatible broker's RPC
//! transport: length-prefixed framing with correlation ids, a multiplexed
//! connection with admission control and orderly shutdown, and a retrying
//! client facade on top.

pub mod admission;
pub mod client;
pub mod config;
pub mod connection;
pub mod correlation;
pub mod credentials;
pub mod error;
pub mod frame;
pub mod gate;
pub mod message;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod probe;
pub mod retry;
pub mod serializer;
pub mod tracing_config;
mod tracing_helpers;

pub use client::{ClientError, RpcClient, RpcClientBuilder};
pub use config::{ConnectionConfig, SocketOptions};
pub use connection::{Connection, ConnectionState};
pub use credentials::{CredentialProvider, StaticCredentials, TlsCredentials};
pub use error::{ConnectError, RequestError, SendError, TransportError};
pub use frame::{Frame, FrameCodec};
#[cfg(feature = "metrics")]
pub use metrics::MetricsProbe;
pub use probe::{CountingProbe, NoopProbe, Probe};
pub use retry::{RetryPolicy, retry_with_mitigation};
pub use serializer::{BincodeSerializer, Serializer};
pub use tracing_config::TracingConfig;
