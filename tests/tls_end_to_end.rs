use bytes::Bytes;
use color_eyre::eyre::{Result, eyre};
use futures_util::{SinkExt, StreamExt};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use socksrv::common::unused_local_port;
use socksrv::{
    KeyStore, ListenerConfig, PemSource, SocketConnectionSettings, SocketError, TcpListenerProvider,
    TcpProtocol, TcpServerSocketProperties, TlsContext, TrustStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

struct TestIdentity {
    _dir: TempDir,
    cert_path: PathBuf,
    key_path: PathBuf,
    cert_der: rustls::pki_types::CertificateDer<'static>,
}

fn self_signed() -> Result<TestIdentity> {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;

    let dir = tempfile::tempdir()?;
    let cert_path = dir.path().join("server.crt");
    let key_path = dir.path().join("server.key");
    std::fs::write(&cert_path, cert.pem())?;
    std::fs::write(&key_path, key_pair.serialize_pem())?;

    Ok(TestIdentity {
        _dir: dir,
        cert_path,
        key_path,
        cert_der: cert.der().clone(),
    })
}

fn connector(identity: &TestIdentity) -> Result<TlsConnector> {
    let mut roots = RootCertStore::empty();
    roots.add(identity.cert_der.clone())?;
    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

fn tls_config(identity: &TestIdentity) -> Result<ListenerConfig> {
    let settings = SocketConnectionSettings::new("127.0.0.1", unused_local_port()?)?;
    let context = TlsContext::new().with_key_store(KeyStore::from_pem_files(
        &identity.cert_path,
        &identity.key_path,
    ));
    Ok(ListenerConfig::new(settings).with_tls(context))
}

fn bounded_tls_config(identity: &TestIdentity) -> Result<ListenerConfig> {
    Ok(tls_config(identity)?.with_properties(
        TcpServerSocketProperties::default().with_client_timeout(Duration::from_secs(5)),
    ))
}

#[tokio::test]
async fn test_tls_echo_round_trip() -> Result<()> {
    let identity = self_signed()?;
    let mut provider = TcpListenerProvider::new(bounded_tls_config(&identity)?);
    provider.initialise()?;

    let listener = provider.connect().await?;
    assert!(listener.is_secure());
    let addr = listener.local_addr()?;

    let server = {
        let listener = Arc::clone(&listener);
        tokio::spawn(async move {
            let mut client = listener.accept().await?;
            assert!(client.is_secure());
            while let Some(message) = client.read_message().await? {
                client.write_message(&message).await?;
            }
            client.close().await
        })
    };

    let tcp = TcpStream::connect(addr).await?;
    let tls = connector(&identity)?
        .connect(ServerName::try_from("localhost")?, tcp)
        .await?;
    let mut framed = TcpProtocol::default().framed(tls);

    framed.send(Bytes::from_static(b"over tls")).await?;
    let echoed = framed
        .next()
        .await
        .ok_or_else(|| eyre!("server closed early"))??;
    assert_eq!(&echoed[..], b"over tls");

    SinkExt::<Bytes>::close(&mut framed).await?;
    drop(framed);
    server.await??;

    provider.disconnect(&listener).await;
    assert!(!provider.validate(&listener).is_valid());
    Ok(())
}

#[tokio::test]
async fn test_failed_handshake_keeps_listener_running() -> Result<()> {
    let identity = self_signed()?;
    let mut provider = TcpListenerProvider::new(bounded_tls_config(&identity)?);
    provider.initialise()?;
    let listener = provider.connect().await?;
    let addr = listener.local_addr()?;

    let mut plaintext = TcpStream::connect(addr).await?;
    plaintext.write_all(b"this is not a client hello").await?;

    let mut bad = listener.accept().await?;
    let err = bad.handshake().await.unwrap_err();
    assert!(matches!(err, SocketError::Handshake { .. }));
    assert!(matches!(
        bad.read_message().await,
        Err(SocketError::IllegalState(_))
    ));
    assert!(provider.validate(&listener).is_valid());

    let acceptor = {
        let listener = Arc::clone(&listener);
        tokio::spawn(async move {
            let mut client = listener.accept().await?;
            client.handshake().await?;
            Ok::<_, SocketError>(client.is_secure())
        })
    };
    let tcp = TcpStream::connect(addr).await?;
    let _tls = connector(&identity)?
        .connect(ServerName::try_from("localhost")?, tcp)
        .await?;
    assert!(acceptor.await??);

    provider.disconnect(&listener).await;
    Ok(())
}

#[tokio::test]
async fn test_silent_peer_does_not_block_accept_loop() -> Result<()> {
    let identity = self_signed()?;
    let mut provider = TcpListenerProvider::new(tls_config(&identity)?);
    provider.initialise()?;
    let listener = provider.connect().await?;
    assert_eq!(listener.properties().client_timeout(), None);
    let addr = listener.local_addr()?;

    let _silent = TcpStream::connect(addr).await?;
    let mut stalled = tokio::time::timeout(Duration::from_secs(2), listener.accept()).await??;

    let server = {
        let listener = Arc::clone(&listener);
        tokio::spawn(async move {
            let mut client = listener.accept().await?;
            let message = client.read_message().await?;
            client.write_message(message.as_deref().unwrap_or_default()).await?;
            client.close().await
        })
    };

    let tcp = TcpStream::connect(addr).await?;
    let tls = connector(&identity)?
        .connect(ServerName::try_from("localhost")?, tcp)
        .await?;
    let mut framed = TcpProtocol::default().framed(tls);
    framed.send(Bytes::from_static(b"not stuck")).await?;
    let echoed = tokio::time::timeout(Duration::from_secs(2), framed.next())
        .await?
        .ok_or_else(|| eyre!("server closed early"))??;
    assert_eq!(&echoed[..], b"not stuck");
    tokio::time::timeout(Duration::from_secs(2), server).await???;

    // The silent client is still waiting on its own handshake
    assert!(
        tokio::time::timeout(Duration::from_millis(100), stalled.handshake())
            .await
            .is_err()
    );
    provider.disconnect(&listener).await;
    Ok(())
}

#[tokio::test]
async fn test_disconnect_during_pending_handshake() -> Result<()> {
    let identity = self_signed()?;
    let mut provider = TcpListenerProvider::new(tls_config(&identity)?);
    provider.initialise()?;
    let listener = provider.connect().await?;
    let addr = listener.local_addr()?;

    let silent = TcpStream::connect(addr).await?;
    let mut stalled = listener.accept().await?;
    let handshake = tokio::spawn(async move { stalled.handshake().await });

    let waiting = {
        let listener = Arc::clone(&listener);
        tokio::spawn(async move { listener.accept().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    provider.disconnect(&listener).await;
    let outcome = tokio::time::timeout(Duration::from_secs(2), waiting).await??;
    assert!(matches!(outcome, Err(SocketError::ListenerClosed)));
    assert!(TcpStream::connect(addr).await.is_err());

    // Closing the listener leaves the accepted client to its own fate
    drop(silent);
    let handshake = tokio::time::timeout(Duration::from_secs(2), handshake).await??;
    assert!(matches!(handshake, Err(SocketError::Handshake { .. })));
    Ok(())
}

#[test]
fn test_initialise_requires_key_store() -> Result<()> {
    let settings = SocketConnectionSettings::new("127.0.0.1", unused_local_port()?)?;
    let context = TlsContext::new().with_trust_store(TrustStore {
        certificates: PemSource::Pem(Vec::new()),
        require_client_auth: false,
    });
    let mut provider = TcpListenerProvider::new(ListenerConfig::new(settings).with_tls(context));

    match provider.initialise() {
        Err(SocketError::Config(message)) => {
            assert!(message.contains("KeyStore must be configured"));
            Ok(())
        }
        other => Err(eyre!("expected configuration error, got {other:?}")),
    }
}

#[test]
fn test_initialise_surfaces_certificate_errors() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let cert_path = dir.path().join("broken.crt");
    std::fs::write(&cert_path, "not a certificate")?;

    let settings = SocketConnectionSettings::new("127.0.0.1", unused_local_port()?)?;
    let context = TlsContext::new()
        .with_key_store(KeyStore::from_pem_files(&cert_path, dir.path().join("missing.key")));
    let mut provider = TcpListenerProvider::new(ListenerConfig::new(settings).with_tls(context));

    assert!(matches!(provider.initialise(), Err(SocketError::Tls(_))));
    assert!(!provider.is_initialised());
    Ok(())
}
