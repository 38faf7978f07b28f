use super::{BuildServerSocket, ClientStream};
use crate::Result;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// Factory for unencrypted TCP server sockets
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpServerSocketFactory;

#[async_trait]
impl BuildServerSocket for TcpServerSocketFactory {
    const SCHEME: &'static str = "tcp";

    async fn secure(&self, stream: TcpStream, _peer: SocketAddr) -> Result<ClientStream> {
        Ok(ClientStream::Plain(stream))
    }
}
