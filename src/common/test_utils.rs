use crate::{Result, SocketError};

/// Find a local TCP port that is free right now
///
/// Binds an ephemeral port on the loopback interface and releases it. Another
/// process may take the port before the caller binds it.
pub fn unused_local_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")
        .map_err(|e| SocketError::Config(format!("Failed to bind probe listener: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| SocketError::Config(format!("Failed to get local address: {e}")))?
        .port();
    drop(listener);
    Ok(port)
}
