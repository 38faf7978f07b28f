use std::net::SocketAddr;
use thiserror::Error;

/// Error types for the socksrv library
#[derive(Error, Debug)]
pub enum SocketError {
    /// Invalid settings, socket properties or TLS configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Binding or listening on an address failed
    #[error("Connection error on {address}: {source}")]
    Connection {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Certificate or private key could not be loaded
    #[error("TLS error: {0}")]
    Tls(String),

    /// TLS handshake with a single client failed
    #[error("TLS handshake with {peer} failed: {reason}")]
    Handshake { peer: SocketAddr, reason: String },

    /// Peer sent bytes that break the framing rules
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Operation not allowed in the current lifecycle state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Accept was interrupted because the listener closed
    #[error("Listener closed")]
    ListenerClosed,

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the socksrv library
pub type Result<T> = std::result::Result<T, SocketError>;

pub mod common;
pub mod connection;
pub mod factory;
pub mod network;
pub mod protocol;
pub mod provider;
pub mod tls;

// Re-export main types for convenience
pub use common::ValidationResult;
pub use connection::{ClientConnection, ListenerConnection, ListenerState};
pub use factory::{
    BuildServerSocket, ServerSocketFactory, TcpServerSocketFactory, TlsServerSocketFactory,
};
pub use network::{SocketConnectionSettings, TcpServerSocketProperties};
pub use protocol::{DEFAULT_MAX_MESSAGE_LENGTH, TcpProtocol};
pub use provider::{ListenerConfig, SocketSecurity, TcpListenerProvider};
pub use tls::{KeyStore, PemSource, TlsContext, TlsVersion, TrustStore};
