//! Establishing the byte stream for a session.

use std::{io, net::SocketAddr};

use log::debug;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpSocket, lookup_host},
    time::timeout,
};

use crate::{config::ConnectionConfig, error::ConnectError};

/// Trait alias for streams a session can run over.
pub trait ClientStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T> ClientStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub(super) type BoxedStream = Box<dyn ClientStream>;

/// Resolve, connect, and optionally TLS-wrap a stream to the configured peer.
pub(super) async fn dial(
    config: &ConnectionConfig,
) -> Result<(BoxedStream, SocketAddr), ConnectError> {
    let addr = resolve(config.server_addr()).await?;
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(ConnectError::Socket)?;
    config
        .socket_options_value()
        .apply(&socket)
        .map_err(ConnectError::Socket)?;

    let connecting = socket.connect(addr);
    let stream = match config.connect_timeout_value() {
        Some(limit) => timeout(limit, connecting)
            .await
            .map_err(|_| ConnectError::Timeout {
                addr,
                timeout: limit,
            })?,
        None => connecting.await,
    }
    .map_err(|source| ConnectError::Unreachable { addr, source })?;

    let credentials = match config.credentials_value() {
        Some(provider) => provider
            .credentials()
            .await
            .map_err(ConnectError::Credentials)?,
        None => None,
    };
    let Some(tls) = credentials else {
        return Ok((Box::new(stream), addr));
    };
    debug!("starting TLS handshake: peer={addr}");
    let stream = tls
        .connector()
        .connect(tls.server_name(), stream)
        .await
        .map_err(|source| ConnectError::Tls { addr, source })?;
    Ok((Box::new(stream), addr))
}

async fn resolve(server_addr: &str) -> Result<SocketAddr, ConnectError> {
    let resolve_error = |source: io::Error| ConnectError::Resolve {
        addr: server_addr.to_owned(),
        source,
    };
    lookup_host(server_addr)
        .await
        .map_err(resolve_error)?
        .next()
        .ok_or_else(|| resolve_error(io::Error::new(io::ErrorKind::NotFound, "no addresses")))
}
