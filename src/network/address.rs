use crate::{Result, SocketError};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;

/// Address where a listener binds: a host name or IP literal plus a port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConnectionSettings {
    host: String,
    port: u16,
}

impl SocketConnectionSettings {
    /// Create settings for the given host and port
    ///
    /// # Examples
    ///
    /// ```
    /// use socksrv::network::SocketConnectionSettings;
    ///
    /// let settings = SocketConnectionSettings::new("0.0.0.0", 9000).unwrap();
    /// assert_eq!(settings.to_string(), "0.0.0.0:9000");
    /// assert!(SocketConnectionSettings::new("0.0.0.0", 0).is_err());
    /// ```
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(SocketError::Config("Listener host must not be empty".into()));
        }
        if port == 0 {
            return Err(SocketError::Config(
                "Listener port must be in the range 1-65535".into(),
            ));
        }
        Ok(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve the host into candidate bind addresses
    ///
    /// Resolution runs under `limit` when one is given.
    pub async fn resolve(&self, limit: Option<Duration>) -> Result<Vec<SocketAddr>> {
        let lookup = tokio::net::lookup_host((self.host.as_str(), self.port));
        let resolved = match limit {
            Some(limit) => timeout(limit, lookup).await.map_err(|_| {
                SocketError::Timeout(format!("Resolving {self} took longer than {limit:?}"))
            })?,
            None => lookup.await,
        };

        let addrs: Vec<SocketAddr> = resolved
            .map_err(|source| SocketError::Connection {
                address: self.to_string(),
                source,
            })?
            .collect();

        if addrs.is_empty() {
            return Err(SocketError::Connection {
                address: self.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "host did not resolve to any address",
                ),
            });
        }
        Ok(addrs)
    }
}

impl fmt::Display for SocketConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl TryFrom<SocketAddr> for SocketConnectionSettings {
    type Error = SocketError;

    fn try_from(addr: SocketAddr) -> Result<Self> {
        Self::new(addr.ip().to_string(), addr.port())
    }
}
