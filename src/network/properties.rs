use crate::{Result, SocketError};
use std::time::Duration;

/// Default listen backlog, matching the classic `ServerSocket` default
pub const DEFAULT_RECEIVE_BACKLOG: u32 = 50;

/// Default bound on resolving and binding during `connect()`
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Low-level tuning for a TCP server socket and the sockets it accepts
///
/// Values are only checked by [`validate`](Self::validate), which runs when a
/// provider is initialised and again right before binding.
///
/// # Examples
///
/// ```
/// use socksrv::network::TcpServerSocketProperties;
/// use std::time::Duration;
///
/// let properties = TcpServerSocketProperties::default()
///     .with_receive_backlog(128)
///     .with_receive_buffer_size(64 * 1024)
///     .with_client_timeout(Duration::from_secs(10));
///
/// assert!(properties.validate().is_ok());
/// assert_eq!(properties.receive_backlog(), 128);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpServerSocketProperties {
    send_buffer_size: Option<u32>,
    receive_buffer_size: Option<u32>,
    reuse_address: bool,
    receive_backlog: u32,
    keep_alive: bool,
    send_tcp_no_delay: bool,
    linger: Option<Duration>,
    client_timeout: Option<Duration>,
    connection_timeout: Option<Duration>,
}

impl Default for TcpServerSocketProperties {
    fn default() -> Self {
        Self {
            send_buffer_size: None,
            receive_buffer_size: None,
            reuse_address: true,
            receive_backlog: DEFAULT_RECEIVE_BACKLOG,
            keep_alive: false,
            send_tcp_no_delay: true,
            linger: None,
            client_timeout: None,
            connection_timeout: Some(DEFAULT_CONNECTION_TIMEOUT),
        }
    }
}

impl TcpServerSocketProperties {
    /// Set SO_SNDBUF for the listening and accepted sockets
    pub fn with_send_buffer_size(mut self, size: u32) -> Self {
        self.send_buffer_size = Some(size);
        self
    }

    /// Set SO_RCVBUF for the listening and accepted sockets
    pub fn with_receive_buffer_size(mut self, size: u32) -> Self {
        self.receive_buffer_size = Some(size);
        self
    }

    pub fn with_reuse_address(mut self, reuse: bool) -> Self {
        self.reuse_address = reuse;
        self
    }

    /// Set the maximum queue of pending connections
    pub fn with_receive_backlog(mut self, backlog: u32) -> Self {
        self.receive_backlog = backlog;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_send_tcp_no_delay(mut self, no_delay: bool) -> Self {
        self.send_tcp_no_delay = no_delay;
        self
    }

    /// Set SO_LINGER for accepted sockets
    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = Some(linger);
        self
    }

    /// Bound reads and the TLS handshake on accepted sockets
    pub fn with_client_timeout(mut self, timeout: Duration) -> Self {
        self.client_timeout = Some(timeout);
        self
    }

    /// Bound address resolution and binding during `connect()`; `None` waits forever
    pub fn with_connection_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn send_buffer_size(&self) -> Option<u32> {
        self.send_buffer_size
    }

    pub fn receive_buffer_size(&self) -> Option<u32> {
        self.receive_buffer_size
    }

    pub fn reuse_address(&self) -> bool {
        self.reuse_address
    }

    pub fn receive_backlog(&self) -> u32 {
        self.receive_backlog
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn send_tcp_no_delay(&self) -> bool {
        self.send_tcp_no_delay
    }

    pub fn linger(&self) -> Option<Duration> {
        self.linger
    }

    pub fn client_timeout(&self) -> Option<Duration> {
        self.client_timeout
    }

    pub fn connection_timeout(&self) -> Option<Duration> {
        self.connection_timeout
    }

    /// Check every property against the range the OS accepts
    pub fn validate(&self) -> Result<()> {
        check_buffer("sendBufferSize", self.send_buffer_size)?;
        check_buffer("receiveBufferSize", self.receive_buffer_size)?;

        if self.receive_backlog == 0 || self.receive_backlog > i32::MAX as u32 {
            return Err(SocketError::Config(format!(
                "receiveBacklog must be between 1 and {}, got {}",
                i32::MAX,
                self.receive_backlog
            )));
        }
        if let Some(linger) = self.linger {
            if linger.as_secs() > u16::MAX as u64 {
                return Err(SocketError::Config(format!(
                    "linger must not exceed {} seconds, got {linger:?}",
                    u16::MAX
                )));
            }
        }
        check_timeout("clientTimeout", self.client_timeout)?;
        check_timeout("connectionTimeout", self.connection_timeout)?;
        Ok(())
    }
}

fn check_buffer(name: &str, size: Option<u32>) -> Result<()> {
    match size {
        Some(0) => Err(SocketError::Config(format!("{name} must be positive, got 0"))),
        Some(size) if size > i32::MAX as u32 => Err(SocketError::Config(format!(
            "{name} must not exceed {}, got {size}",
            i32::MAX
        ))),
        _ => Ok(()),
    }
}

fn check_timeout(name: &str, timeout: Option<Duration>) -> Result<()> {
    match timeout {
        Some(timeout) if timeout.is_zero() => Err(SocketError::Config(format!(
            "{name} must be greater than zero when set"
        ))),
        _ => Ok(()),
    }
}
