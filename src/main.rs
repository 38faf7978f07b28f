use color_eyre::eyre::{Result, WrapErr, bail};
use socksrv::{
    ClientConnection, KeyStore, ListenerConfig, SocketConnectionSettings, SocketError,
    TcpListenerProvider, TlsContext,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 9000;
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("socksrv=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().collect();
    let mode = args.get(1).map(|s| s.to_lowercase()).unwrap_or_else(|| "plain".to_string());
    let port = match args.get(2) {
        Some(port) => port
            .parse::<u16>()
            .wrap_err_with(|| format!("Invalid port: {port}"))?,
        None => DEFAULT_PORT,
    };
    let host = std::env::var("SOCKSRV_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

    let settings = SocketConnectionSettings::new(host, port).wrap_err("Invalid listen address")?;
    let config = match mode.as_str() {
        "plain" => ListenerConfig::new(settings),
        "tls" => {
            let (Some(cert), Some(key)) = (args.get(3), args.get(4)) else {
                usage(&args[0]);
                bail!("TLS mode needs a certificate and a private key");
            };
            let context = TlsContext::new().with_key_store(KeyStore::from_pem_files(cert, key));
            ListenerConfig::new(settings).with_tls(context)
        }
        _ => {
            usage(&args[0]);
            std::process::exit(1);
        }
    };

    let mut provider = TcpListenerProvider::new(config);
    provider
        .initialise()
        .wrap_err("Failed to initialise listener provider")?;
    let provider = Arc::new(provider);

    let listener = provider.connect().await.wrap_err("Failed to bind listener")?;
    info!(
        address = %listener.local_addr()?,
        secure = listener.is_secure(),
        protocol = listener.protocol().name(),
        "Starting framed echo server"
    );

    let shutdown = {
        let provider = Arc::clone(&provider);
        let listener = Arc::clone(&listener);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                provider.disconnect(&listener).await;
            }
        })
    };

    loop {
        match listener.accept().await {
            Ok(client) => {
                tokio::spawn(echo(client));
            }
            Err(e) => {
                let Some(delay) = accept_retry_delay(&e, provider.validate(&listener).is_valid())
                else {
                    break;
                };
                warn!(error = %e, retry_in = ?delay, "Accept failed");
                tokio::time::sleep(delay).await;
            }
        }
    }

    shutdown.abort();
    info!("Server stopped");
    Ok(())
}

/// How long to wait before accepting again, or `None` to stop serving
///
/// Errors such as EMFILE persist until some client goes away, so retrying at
/// once would only spin.
fn accept_retry_delay(error: &SocketError, listener_valid: bool) -> Option<Duration> {
    match error {
        SocketError::ListenerClosed => None,
        _ if !listener_valid => None,
        _ => Some(ACCEPT_ERROR_BACKOFF),
    }
}

async fn echo(mut client: ClientConnection) {
    let peer = client.peer_addr();
    loop {
        match client.read_message().await {
            Ok(Some(message)) => {
                debug!(peer = %peer, bytes = message.len(), "Echoing message");
                if let Err(e) = client.write_message(&message).await {
                    warn!(peer = %peer, error = %e, "Write failed");
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Read failed");
                return;
            }
        }
    }
    if let Err(e) = client.close().await {
        debug!(peer = %peer, error = %e, "Close failed");
    }
}

fn usage(program: &str) {
    eprintln!("Usage: {program} [plain|tls] [port] [cert.pem key.pem]");
    eprintln!("  plain|tls: Listener mode (default: plain)");
    eprintln!("  port:      Port to bind to (default: {DEFAULT_PORT})");
    eprintln!("  cert.pem key.pem: PEM certificate chain and private key, TLS only");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SOCKSRV_HOST  Interface to bind (default: 0.0.0.0)");
    eprintln!("  RUST_LOG      Log filter (default: socksrv=info)");
}
