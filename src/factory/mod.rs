//! Server socket factories
//!
//! A factory turns an address and a set of [`TcpServerSocketProperties`] into
//! a bound, listening [`ServerSocket`], and prepares each accepted socket for
//! use. The plain and TLS variants share socket creation and differ only in
//! what happens to a connection after `accept()`.

pub mod plain;
pub mod socket_builder;
pub mod stream;
pub mod tls;

pub use plain::TcpServerSocketFactory;
pub use stream::ClientStream;
pub use tls::TlsServerSocketFactory;

use crate::network::TcpServerSocketProperties;
use crate::tls::TlsContext;
use crate::{Result, SocketError};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use tokio::net::{TcpListener, TcpStream};

/// Protocol-specific server socket creation
#[async_trait]
pub trait BuildServerSocket: Send + Sync {
    /// Short scheme name used in logs
    const SCHEME: &'static str;

    /// Bind and listen on `addr`
    ///
    /// On failure nothing stays open.
    fn create_server_socket(
        &self,
        addr: SocketAddr,
        properties: &TcpServerSocketProperties,
    ) -> Result<ServerSocket> {
        let listener = socket_builder::bind_listener(addr, properties).map_err(|source| {
            SocketError::Connection {
                address: addr.to_string(),
                source,
            }
        })?;
        Ok(ServerSocket::new(listener, Self::SCHEME))
    }

    /// Turn a raw accepted socket into a client stream
    async fn secure(&self, stream: TcpStream, peer: SocketAddr) -> Result<ClientStream>;
}

/// A bound, listening socket
#[derive(Debug)]
pub struct ServerSocket {
    listener: TcpListener,
    scheme: &'static str,
}

impl ServerSocket {
    pub(crate) fn new(listener: TcpListener, scheme: &'static str) -> Self {
        Self { listener, scheme }
    }

    /// Poll for the next connection
    ///
    /// Only the waker of the most recent poll is registered, so concurrent
    /// callers must take turns.
    pub fn poll_accept(&self, cx: &mut Context<'_>) -> Poll<io::Result<(TcpStream, SocketAddr)>> {
        self.listener.poll_accept(cx)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn scheme(&self) -> &'static str {
        self.scheme
    }
}

/// The factory a provider resolved at initialisation
#[derive(Debug, Clone)]
pub enum ServerSocketFactory {
    Plain(TcpServerSocketFactory),
    Tls(TlsServerSocketFactory),
}

impl ServerSocketFactory {
    /// Pick the factory for an optional TLS context
    ///
    /// A context without a key store is rejected here, before any socket
    /// exists.
    pub fn resolve(tls: Option<&TlsContext>) -> Result<Self> {
        match tls {
            Some(context) => Ok(ServerSocketFactory::Tls(TlsServerSocketFactory::new(context)?)),
            None => Ok(ServerSocketFactory::Plain(TcpServerSocketFactory)),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            ServerSocketFactory::Plain(_) => TcpServerSocketFactory::SCHEME,
            ServerSocketFactory::Tls(_) => TlsServerSocketFactory::SCHEME,
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, ServerSocketFactory::Tls(_))
    }

    pub fn create_server_socket(
        &self,
        addr: SocketAddr,
        properties: &TcpServerSocketProperties,
    ) -> Result<ServerSocket> {
        match self {
            ServerSocketFactory::Plain(factory) => factory.create_server_socket(addr, properties),
            ServerSocketFactory::Tls(factory) => factory.create_server_socket(addr, properties),
        }
    }

    pub async fn secure(&self, stream: TcpStream, peer: SocketAddr) -> Result<ClientStream> {
        match self {
            ServerSocketFactory::Plain(factory) => factory.secure(stream, peer).await,
            ServerSocketFactory::Tls(factory) => factory.secure(stream, peer).await,
        }
    }
}
