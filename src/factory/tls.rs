use super::{BuildServerSocket, ClientStream};
use crate::tls::TlsContext;
use crate::{Result, SocketError};
use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

/// Factory for TLS server sockets
///
/// The listening socket itself is plain TCP; every accepted connection goes
/// through the server handshake in [`secure`](BuildServerSocket::secure)
/// before the caller sees it.
#[derive(Clone)]
pub struct TlsServerSocketFactory {
    acceptor: TlsAcceptor,
}

impl TlsServerSocketFactory {
    /// Build the factory, loading all key material from `context` up front
    pub fn new(context: &TlsContext) -> Result<Self> {
        if !context.is_key_store_configured() {
            return Err(SocketError::Config(
                "KeyStore must be configured for server side TLS".into(),
            ));
        }
        let config = context.initialise()?;
        Ok(Self {
            acceptor: TlsAcceptor::from(config),
        })
    }
}

impl fmt::Debug for TlsServerSocketFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsServerSocketFactory").finish_non_exhaustive()
    }
}

#[async_trait]
impl BuildServerSocket for TlsServerSocketFactory {
    const SCHEME: &'static str = "tls";

    async fn secure(&self, stream: TcpStream, peer: SocketAddr) -> Result<ClientStream> {
        let stream = self
            .acceptor
            .accept(stream)
            .await
            .map_err(|e| SocketError::Handshake {
                peer,
                reason: e.to_string(),
            })?;
        Ok(ClientStream::Tls(Box::new(stream)))
    }
}
