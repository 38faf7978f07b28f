use super::config::ListenerConfig;
use crate::common::ValidationResult;
use crate::connection::ListenerConnection;
use crate::factory::ServerSocketFactory;
use crate::{Result, SocketError};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Provides one cached [`ListenerConnection`] to every caller
///
/// `initialise()` must succeed before anything else. It checks the socket
/// properties and, for TLS, loads the key material.
///
/// Lifecycle transitions (`connect`, `disconnect`, `evict`) are serialised by
/// one async lock around the cached slot.
///
/// # Examples
///
/// ```no_run
/// use socksrv::network::SocketConnectionSettings;
/// use socksrv::provider::{ListenerConfig, TcpListenerProvider};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let settings = SocketConnectionSettings::new("0.0.0.0", 9000)?;
///     let mut provider = TcpListenerProvider::new(ListenerConfig::new(settings));
///     provider.initialise()?;
///
///     let listener = provider.connect().await?;
///     assert!(provider.validate(&listener).is_valid());
///
///     provider.disconnect(&listener).await;
///     assert!(!provider.validate(&listener).is_valid());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct TcpListenerProvider {
    config: ListenerConfig,
    factory: Option<ServerSocketFactory>,
    cached: Mutex<Option<Arc<ListenerConnection>>>,
}

impl TcpListenerProvider {
    pub fn new(config: ListenerConfig) -> Self {
        Self {
            config,
            factory: None,
            cached: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    pub fn is_initialised(&self) -> bool {
        self.factory.is_some()
    }

    /// Validate configuration and resolve the socket factory
    pub fn initialise(&mut self) -> Result<()> {
        self.config.properties.validate()?;

        let tls = self.config.security.tls_context();
        if let Some(context) = tls {
            if !context.is_key_store_configured() {
                return Err(SocketError::Config(
                    "KeyStore must be configured for server side TLS".into(),
                ));
            }
        }

        let factory = ServerSocketFactory::resolve(tls)?;
        info!(
            address = %self.config.connection,
            scheme = factory.scheme(),
            protocol = self.config.protocol.name(),
            "Listener provider initialised"
        );
        self.factory = Some(factory);
        Ok(())
    }

    /// Return the cached listener, binding a new one if there is none
    ///
    /// A cached listener that is no longer valid is closed and replaced.
    pub async fn connect(&self) -> Result<Arc<ListenerConnection>> {
        let factory = self.factory.as_ref().ok_or_else(|| {
            SocketError::IllegalState("Listener provider has not been initialised".into())
        })?;

        let mut cached = self.cached.lock().await;
        if let Some(existing) = cached.as_ref() {
            if existing.is_valid() {
                debug!(address = %self.config.connection, "Reusing cached listener");
                return Ok(Arc::clone(existing));
            }
            info!(
                address = %self.config.connection,
                state = %existing.state(),
                "Replacing invalid cached listener"
            );
            existing.disconnect();
            *cached = None;
        }

        let connection = Arc::new(ListenerConnection::new(
            self.config.connection.clone(),
            self.config.properties.clone(),
            self.config.protocol.clone(),
            factory.clone(),
        ));
        connection.connect().await?;
        *cached = Some(Arc::clone(&connection));
        Ok(connection)
    }

    /// Close `connection`; the cache entry itself is left in place
    pub async fn disconnect(&self, connection: &ListenerConnection) {
        let _guard = self.cached.lock().await;
        connection.disconnect();
    }

    pub fn validate(&self, connection: &ListenerConnection) -> ValidationResult {
        if connection.is_valid() {
            ValidationResult::success()
        } else {
            ValidationResult::failure(format!(
                "Listener on {} is not connected (state: {})",
                connection.settings(),
                connection.state()
            ))
        }
    }

    /// The currently cached listener, if any
    pub async fn cached(&self) -> Option<Arc<ListenerConnection>> {
        self.cached.lock().await.clone()
    }

    /// Drop the cached listener, closing it
    pub async fn evict(&self) -> Option<Arc<ListenerConnection>> {
        let evicted = self.cached.lock().await.take();
        if let Some(connection) = &evicted {
            connection.disconnect();
        }
        evicted
    }
}
