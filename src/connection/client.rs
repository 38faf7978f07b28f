use crate::factory::ClientStream;
use crate::protocol::TcpProtocol;
use crate::{Result, SocketError};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::codec::Framed;

/// Pending transport setup for an accepted socket (the TLS handshake)
pub(crate) type Handshake = Pin<Box<dyn Future<Output = Result<ClientStream>> + Send>>;

enum Transport {
    Handshaking(Handshake),
    Ready(Framed<ClientStream, TcpProtocol>),
    Failed,
}

/// An accepted client, framed with the listener's protocol
///
/// Errors on one client never affect the listener that produced it; after a
/// [`SocketError::ProtocolViolation`] or [`SocketError::Handshake`] the caller
/// should drop this connection.
///
/// The handshake, if any, completes on the first read or write. It is bounded
/// by the same client timeout as reads.
pub struct ClientConnection {
    transport: Transport,
    protocol: TcpProtocol,
    peer_addr: SocketAddr,
    secure: bool,
    read_timeout: Option<Duration>,
}

impl ClientConnection {
    pub(crate) fn new(
        handshake: Handshake,
        peer_addr: SocketAddr,
        protocol: &TcpProtocol,
        secure: bool,
        read_timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport: Transport::Handshaking(handshake),
            protocol: protocol.clone(),
            peer_addr,
            secure,
            read_timeout,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn protocol(&self) -> &TcpProtocol {
        &self.protocol
    }

    /// Finish the TLS handshake now instead of on first use
    ///
    /// A no-op for plain connections and for connections already set up.
    pub async fn handshake(&mut self) -> Result<()> {
        self.framed().await.map(|_| ())
    }

    async fn framed(&mut self) -> Result<&mut Framed<ClientStream, TcpProtocol>> {
        if let Transport::Handshaking(handshake) = &mut self.transport {
            let outcome = match self.read_timeout {
                Some(limit) => match timeout(limit, handshake.as_mut()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(SocketError::Handshake {
                        peer: self.peer_addr,
                        reason: format!("timed out after {limit:?}"),
                    }),
                },
                None => handshake.as_mut().await,
            };
            match outcome {
                Ok(stream) => self.transport = Transport::Ready(self.protocol.framed(stream)),
                Err(e) => {
                    self.transport = Transport::Failed;
                    return Err(e);
                }
            }
        }

        match &mut self.transport {
            Transport::Ready(framed) => Ok(framed),
            _ => Err(SocketError::IllegalState(format!(
                "Handshake with {} already failed",
                self.peer_addr
            ))),
        }
    }

    /// Read the next complete message
    ///
    /// Returns `Ok(None)` once the peer has closed the stream on a message
    /// boundary.
    pub async fn read_message(&mut self) -> Result<Option<Bytes>> {
        let peer = self.peer_addr;
        let limit = self.read_timeout;
        let framed = self.framed().await?;
        let next = match limit {
            Some(limit) => timeout(limit, framed.next()).await.map_err(|_| {
                SocketError::Timeout(format!("No message from {peer} within {limit:?}"))
            })?,
            None => framed.next().await,
        };
        next.transpose()
    }

    /// Frame and send one message, flushing it to the socket
    pub async fn write_message(&mut self, payload: &[u8]) -> Result<()> {
        self.framed()
            .await?
            .send(Bytes::copy_from_slice(payload))
            .await
    }

    /// Flush pending output and shut down the write side
    ///
    /// A connection whose handshake never finished is simply dropped.
    pub async fn close(mut self) -> Result<()> {
        match &mut self.transport {
            Transport::Ready(framed) => SinkExt::<Bytes>::close(framed).await,
            Transport::Handshaking(_) | Transport::Failed => Ok(()),
        }
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let transport = match self.transport {
            Transport::Handshaking(_) => "handshaking",
            Transport::Ready(_) => "ready",
            Transport::Failed => "failed",
        };
        f.debug_struct("ClientConnection")
            .field("peer_addr", &self.peer_addr)
            .field("secure", &self.secure)
            .field("protocol", &self.protocol.name())
            .field("transport", &transport)
            .finish()
    }
}
