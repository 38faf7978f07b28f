use crate::network::{SocketConnectionSettings, TcpServerSocketProperties};
use crate::protocol::TcpProtocol;
use crate::tls::TlsContext;

/// Whether accepted connections are encrypted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SocketSecurity {
    #[default]
    Plain,
    Tls(TlsContext),
}

impl SocketSecurity {
    pub fn tls_context(&self) -> Option<&TlsContext> {
        match self {
            SocketSecurity::Plain => None,
            SocketSecurity::Tls(context) => Some(context),
        }
    }
}

/// Everything a listener provider needs, supplied by the host
///
/// # Examples
///
/// ```
/// use socksrv::network::{SocketConnectionSettings, TcpServerSocketProperties};
/// use socksrv::provider::ListenerConfig;
///
/// let config = ListenerConfig::new(SocketConnectionSettings::new("0.0.0.0", 9000).unwrap())
///     .with_properties(TcpServerSocketProperties::default().with_keep_alive(true));
///
/// assert!(config.security.tls_context().is_none());
/// assert_eq!(config.protocol.name(), "safe");
/// ```
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to listen on
    pub connection: SocketConnectionSettings,
    /// Socket tuning
    pub properties: TcpServerSocketProperties,
    /// Framing used on accepted connections
    pub protocol: TcpProtocol,
    /// Plain TCP or TLS
    pub security: SocketSecurity,
}

impl ListenerConfig {
    pub fn new(connection: SocketConnectionSettings) -> Self {
        Self {
            connection,
            properties: TcpServerSocketProperties::default(),
            protocol: TcpProtocol::default(),
            security: SocketSecurity::Plain,
        }
    }

    pub fn with_properties(mut self, properties: TcpServerSocketProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_protocol(mut self, protocol: TcpProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_tls(mut self, context: TlsContext) -> Self {
        self.security = SocketSecurity::Tls(context);
        self
    }
}
