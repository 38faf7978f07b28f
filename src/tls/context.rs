use crate::{Result, SocketError};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig, SupportedProtocolVersion};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Where PEM material comes from
#[derive(Clone, PartialEq, Eq)]
pub enum PemSource {
    /// A PEM file read when the context is initialised
    File(PathBuf),
    /// PEM bytes held in memory
    Pem(Vec<u8>),
}

impl PemSource {
    fn load(&self) -> Result<Vec<u8>> {
        match self {
            PemSource::File(path) => std::fs::read(path).map_err(|e| {
                SocketError::Tls(format!("Failed to read {}: {e}", path.display()))
            }),
            PemSource::Pem(bytes) => Ok(bytes.clone()),
        }
    }

    fn describe(&self) -> String {
        match self {
            PemSource::File(path) => path.display().to_string(),
            PemSource::Pem(_) => "inline PEM".to_string(),
        }
    }

    fn certificates(&self) -> Result<Vec<CertificateDer<'static>>> {
        let pem = self.load()?;
        let certs = rustls_pemfile::certs(&mut &pem[..])
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                SocketError::Tls(format!("Invalid certificate in {}: {e}", self.describe()))
            })?;
        if certs.is_empty() {
            return Err(SocketError::Tls(format!(
                "No certificate found in {}",
                self.describe()
            )));
        }
        Ok(certs)
    }

    fn private_key(&self) -> Result<PrivateKeyDer<'static>> {
        let pem = self.load()?;
        rustls_pemfile::private_key(&mut &pem[..])
            .map_err(|e| {
                SocketError::Tls(format!("Invalid private key in {}: {e}", self.describe()))
            })?
            .ok_or_else(|| {
                SocketError::Tls(format!("No private key found in {}", self.describe()))
            })
    }
}

impl fmt::Debug for PemSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PemSource::File(path) => f.debug_tuple("File").field(path).finish(),
            PemSource::Pem(bytes) => write!(f, "Pem({} bytes)", bytes.len()),
        }
    }
}

/// Server identity: certificate chain plus the matching private key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStore {
    pub certificates: PemSource,
    pub private_key: PemSource,
}

impl KeyStore {
    pub fn from_pem_files(certificates: impl Into<PathBuf>, private_key: impl Into<PathBuf>) -> Self {
        Self {
            certificates: PemSource::File(certificates.into()),
            private_key: PemSource::File(private_key.into()),
        }
    }

    pub fn from_pem(certificates: impl Into<Vec<u8>>, private_key: impl Into<Vec<u8>>) -> Self {
        Self {
            certificates: PemSource::Pem(certificates.into()),
            private_key: PemSource::Pem(private_key.into()),
        }
    }
}

/// CA certificates used to verify client certificates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustStore {
    pub certificates: PemSource,
    /// Reject clients that present no certificate
    pub require_client_auth: bool,
}

/// TLS protocol versions a listener may negotiate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

impl TlsVersion {
    fn as_rustls(self) -> &'static SupportedProtocolVersion {
        match self {
            TlsVersion::Tls12 => &rustls::version::TLS12,
            TlsVersion::Tls13 => &rustls::version::TLS13,
        }
    }
}

/// Trust and key material for server-side TLS
///
/// Its presence on a listener is what turns the plain factory into the TLS
/// one. A server context is only usable with a [`KeyStore`]; a trust store on
/// its own is a client-side concern.
///
/// # Examples
///
/// ```
/// use socksrv::tls::{KeyStore, TlsContext};
///
/// let context = TlsContext::new()
///     .with_key_store(KeyStore::from_pem_files("server.crt", "server.key"));
/// assert!(context.is_key_store_configured());
/// assert!(!TlsContext::new().is_key_store_configured());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsContext {
    key_store: Option<KeyStore>,
    trust_store: Option<TrustStore>,
    enabled_protocols: Vec<TlsVersion>,
}

impl Default for TlsContext {
    fn default() -> Self {
        Self {
            key_store: None,
            trust_store: None,
            enabled_protocols: vec![TlsVersion::Tls12, TlsVersion::Tls13],
        }
    }
}

impl TlsContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key_store(mut self, key_store: KeyStore) -> Self {
        self.key_store = Some(key_store);
        self
    }

    pub fn with_trust_store(mut self, trust_store: TrustStore) -> Self {
        self.trust_store = Some(trust_store);
        self
    }

    pub fn with_enabled_protocols(mut self, protocols: impl IntoIterator<Item = TlsVersion>) -> Self {
        self.enabled_protocols = protocols.into_iter().collect();
        self
    }

    pub fn key_store(&self) -> Option<&KeyStore> {
        self.key_store.as_ref()
    }

    pub fn trust_store(&self) -> Option<&TrustStore> {
        self.trust_store.as_ref()
    }

    pub fn enabled_protocols(&self) -> &[TlsVersion] {
        &self.enabled_protocols
    }

    pub fn is_key_store_configured(&self) -> bool {
        self.key_store.is_some()
    }

    pub fn is_trust_store_configured(&self) -> bool {
        self.trust_store.is_some()
    }

    /// Load every certificate and key and build the server configuration
    ///
    /// All material is read here, so a bad file or a key that does not match
    /// its certificate is reported before any socket is opened.
    pub fn initialise(&self) -> Result<Arc<ServerConfig>> {
        let key_store = self.key_store.as_ref().ok_or_else(|| {
            SocketError::Config("KeyStore must be configured for server side TLS".into())
        })?;
        if self.enabled_protocols.is_empty() {
            return Err(SocketError::Config(
                "At least one TLS protocol version must be enabled".into(),
            ));
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let versions: Vec<&'static SupportedProtocolVersion> = self
            .enabled_protocols
            .iter()
            .map(|version| version.as_rustls())
            .collect();

        let builder = ServerConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(&versions)
            .map_err(|e| SocketError::Tls(format!("Unsupported protocol selection: {e}")))?;

        let builder = match &self.trust_store {
            Some(trust_store) => {
                let mut roots = RootCertStore::empty();
                for cert in trust_store.certificates.certificates()? {
                    roots.add(cert).map_err(|e| {
                        SocketError::Tls(format!("Invalid trust store certificate: {e}"))
                    })?;
                }
                let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider);
                let verifier = if trust_store.require_client_auth {
                    verifier.build()
                } else {
                    verifier.allow_unauthenticated().build()
                }
                .map_err(|e| SocketError::Tls(format!("Invalid trust store: {e}")))?;
                builder.with_client_cert_verifier(verifier)
            }
            None => builder.with_no_client_auth(),
        };

        let certs = key_store.certificates.certificates()?;
        let key = key_store.private_key.private_key()?;
        let config = builder
            .with_single_cert(certs, key)
            .map_err(|e| SocketError::Tls(format!("Key store rejected: {e}")))?;

        tracing::debug!(
            protocols = ?self.enabled_protocols,
            client_auth = self.trust_store.is_some(),
            "TLS context initialised"
        );
        Ok(Arc::new(config))
    }
}
