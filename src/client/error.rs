//! Error type for [`RpcClient`](super::RpcClient) operations.

use crate::{
    error::{ConnectError, RequestError},
    retry::Retryable,
};

/// Errors emitted by [`crate::RpcClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Establishing the session failed.
    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),
    /// The request failed on the connection.
    #[error("request failed: {0}")]
    Request(#[from] RequestError),
    /// Failed to serialize an outbound body.
    #[error("failed to serialize message")]
    Serialize(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// Failed to deserialize a reply body.
    #[error("failed to deserialize message")]
    Deserialize(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The client is stopping and accepts no further calls.
    #[error("client is shutting down")]
    ShuttingDown,
}

impl Retryable for ClientError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Connect(_) => true,
            Self::Request(RequestError::Send(error)) => !error.is_fatal(),
            Self::Request(RequestError::Transport(_)) => true,
            Self::Serialize(_) | Self::Deserialize(_) | Self::ShuttingDown => false,
        }
    }
}
