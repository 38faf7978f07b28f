//! Server-side TLS trust and key material

pub mod context;

pub use context::{KeyStore, PemSource, TlsContext, TlsVersion, TrustStore};
