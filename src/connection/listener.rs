use super::client::{ClientConnection, Handshake};
use crate::factory::socket_builder::configure_accepted;
use crate::factory::{ServerSocket, ServerSocketFactory};
use crate::network::{SocketConnectionSettings, TcpServerSocketProperties};
use crate::protocol::TcpProtocol;
use crate::{Result, SocketError};
use std::fmt;
use std::future::poll_fn;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};
use std::task::Poll;
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Lifecycle of a [`ListenerConnection`]
///
/// `Disconnected` is terminal: a closed listener is replaced, never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Created,
    Connected,
    Disconnected,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerState::Created => f.write_str("created"),
            ListenerState::Connected => f.write_str("connected"),
            ListenerState::Disconnected => f.write_str("disconnected"),
        }
    }
}

enum Slot {
    Created,
    Connected(ServerSocket),
    Disconnected,
}

impl Slot {
    fn state(&self) -> ListenerState {
        match self {
            Slot::Created => ListenerState::Created,
            Slot::Connected(_) => ListenerState::Connected,
            Slot::Disconnected => ListenerState::Disconnected,
        }
    }
}

/// One listening socket plus everything needed to serve clients on it
///
/// `accept()` may run on any number of tasks while another task calls
/// `disconnect()`. The slot owns the listening socket outright and its lock is
/// never held across an await, so `disconnect()` closes the descriptor before
/// it returns. A pending accept watches the `closed` channel and returns
/// [`SocketError::ListenerClosed`] as soon as the listener is closed.
pub struct ListenerConnection {
    settings: SocketConnectionSettings,
    properties: TcpServerSocketProperties,
    protocol: TcpProtocol,
    factory: ServerSocketFactory,
    slot: Mutex<Slot>,
    accept_turn: AsyncMutex<()>,
    closed: watch::Sender<bool>,
}

impl ListenerConnection {
    pub fn new(
        settings: SocketConnectionSettings,
        properties: TcpServerSocketProperties,
        protocol: TcpProtocol,
        factory: ServerSocketFactory,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            settings,
            properties,
            protocol,
            factory,
            slot: Mutex::new(Slot::Created),
            accept_turn: AsyncMutex::new(()),
            closed,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        // A panic elsewhere cannot leave Slot half-written
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> ListenerState {
        self.slot().state()
    }

    pub fn settings(&self) -> &SocketConnectionSettings {
        &self.settings
    }

    pub fn properties(&self) -> &TcpServerSocketProperties {
        &self.properties
    }

    pub fn protocol(&self) -> &TcpProtocol {
        &self.protocol
    }

    pub fn is_secure(&self) -> bool {
        self.factory.is_secure()
    }

    /// Address the socket is actually bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        match &*self.slot() {
            Slot::Connected(socket) => Ok(socket.local_addr()?),
            other => Err(SocketError::IllegalState(format!(
                "Listener on {} is {}, it has no local address",
                self.settings,
                other.state()
            ))),
        }
    }

    /// Bind and start listening
    ///
    /// Resolution and binding together are bounded by the connection
    /// timeout. Every candidate address is tried in order; the error from the
    /// last one is reported. On failure the listener stays `Created`.
    pub async fn connect(&self) -> Result<()> {
        self.ensure_state(ListenerState::Created, "connect")?;
        self.properties.validate()?;

        let limit = self.properties.connection_timeout();
        let socket = match limit {
            Some(limit) => timeout(limit, self.bind()).await.map_err(|_| {
                SocketError::Timeout(format!(
                    "Binding {} took longer than {limit:?}",
                    self.settings
                ))
            })??,
            None => self.bind().await?,
        };
        let local_addr = socket.local_addr()?;

        let mut slot = self.slot();
        if !matches!(*slot, Slot::Created) {
            // Lost a race with another connect() or a disconnect(); the
            // freshly bound socket is dropped here.
            return Err(SocketError::IllegalState(format!(
                "Cannot connect a listener that is {}",
                slot.state()
            )));
        }
        *slot = Slot::Connected(socket);
        drop(slot);

        info!(
            address = %local_addr,
            scheme = self.factory.scheme(),
            protocol = self.protocol.name(),
            "Listener bound"
        );
        Ok(())
    }

    async fn bind(&self) -> Result<ServerSocket> {
        let candidates = self.settings.resolve(None).await?;

        let mut last_error = None;
        for addr in candidates {
            match self.factory.create_server_socket(addr, &self.properties) {
                Ok(socket) => return Ok(socket),
                Err(e) => {
                    debug!(address = %addr, error = %e, "Bind attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| SocketError::Connection {
            address: self.settings.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "no address to bind",
            ),
        }))
    }

    /// Wait for the next client
    ///
    /// The returned connection has its socket options applied and is framed
    /// with this listener's protocol. On a secure listener the TLS handshake
    /// runs on the connection's first read or write (or an explicit
    /// [`ClientConnection::handshake`]), so a slow or silent peer never holds
    /// up the accept loop.
    pub async fn accept(&self) -> Result<ClientConnection> {
        let mut closed = self.closed.subscribe();
        self.ensure_state(ListenerState::Connected, "accept on")?;

        let (stream, peer) = tokio::select! {
            accepted = self.next_stream() => accepted?,
            _ = closed.wait_for(|closed| *closed) => return Err(SocketError::ListenerClosed),
        };

        if let Err(e) = configure_accepted(&stream, &self.properties) {
            warn!(%peer, error = %e, "Failed to apply client socket options");
        }

        let factory = self.factory.clone();
        let handshake: Handshake = Box::pin(async move { factory.secure(stream, peer).await });

        debug!(%peer, secure = self.factory.is_secure(), "Accepted client");
        Ok(ClientConnection::new(
            handshake,
            peer,
            &self.protocol,
            self.factory.is_secure(),
            self.properties.client_timeout(),
        ))
    }

    async fn next_stream(&self) -> Result<(TcpStream, SocketAddr)> {
        let _turn = self.accept_turn.lock().await;
        poll_fn(|cx| match &*self.slot() {
            Slot::Connected(socket) => socket.poll_accept(cx).map_err(SocketError::from),
            _ => Poll::Ready(Err(SocketError::ListenerClosed)),
        })
        .await
    }

    /// Close the listening socket
    ///
    /// Calling this again, or on a listener that never connected, is a no-op
    /// apart from making the state terminal.
    pub fn disconnect(&self) {
        let previous = std::mem::replace(&mut *self.slot(), Slot::Disconnected);
        self.closed.send_replace(true);

        if let Slot::Connected(socket) = previous {
            match socket.local_addr() {
                Ok(addr) => info!(address = %addr, "Listener closed"),
                Err(_) => info!(address = %self.settings, "Listener closed"),
            }
        }
    }

    /// True while connected and the OS still reports the socket as bound
    pub fn is_valid(&self) -> bool {
        match &*self.slot() {
            Slot::Connected(socket) => socket.local_addr().is_ok(),
            _ => false,
        }
    }

    fn ensure_state(&self, expected: ListenerState, operation: &str) -> Result<()> {
        let current = self.state();
        if current != expected {
            return Err(SocketError::IllegalState(format!(
                "Cannot {operation} a listener that is {current}"
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for ListenerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerConnection")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .field("scheme", &self.factory.scheme())
            .field("protocol", &self.protocol.name())
            .finish()
    }
}

impl Drop for ListenerConnection {
    fn drop(&mut self) {
        self.closed.send_replace(true);
    }
}
