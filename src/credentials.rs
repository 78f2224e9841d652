//! TLS material supplied at connect time.
//!
//! Building certificates and trust roots is left to the embedding
//! application. A [`CredentialProvider`] hands the connection a ready
//! [`TlsConnector`] and the server name to verify; returning `None` keeps
//! the connection in plaintext.

use std::{error::Error, fmt};

use async_trait::async_trait;
use tokio_rustls::{TlsConnector, rustls::pki_types::ServerName};

/// Ready-to-use TLS wrap material.
#[derive(Clone)]
pub struct TlsCredentials {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl TlsCredentials {
    /// Pair a connector with the name the peer certificate must match.
    #[must_use]
    pub fn new(connector: TlsConnector, server_name: ServerName<'static>) -> Self {
        Self {
            connector,
            server_name,
        }
    }

    pub(crate) fn connector(&self) -> &TlsConnector { &self.connector }

    pub(crate) fn server_name(&self) -> ServerName<'static> { self.server_name.clone() }
}

impl fmt::Debug for TlsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsCredentials")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

/// Source of TLS material, consulted on every connection attempt.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return TLS material for the next session, or `None` for plaintext.
    ///
    /// # Errors
    ///
    /// Returns an error if the material cannot be loaded; the connection
    /// attempt then fails with
    /// [`ConnectError::Credentials`](crate::error::ConnectError::Credentials).
    async fn credentials(&self) -> Result<Option<TlsCredentials>, Box<dyn Error + Send + Sync>>;
}

/// Provider returning the same material for every session.
#[derive(Clone, Debug)]
pub struct StaticCredentials(pub TlsCredentials);

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self) -> Result<Option<TlsCredentials>, Box<dyn Error + Send + Sync>> {
        Ok(Some(self.0.clone()))
    }
}
