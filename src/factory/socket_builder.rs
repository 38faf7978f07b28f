// Server socket construction and tuning
//
// SO_REUSEADDR, the buffer sizes and the backlog must be set before
// bind()/listen(). Any error drops the socket2 handle and closes the
// descriptor.
//
// Per-connection options are applied again on every accepted socket.

use crate::network::TcpServerSocketProperties;
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

/// Create a non-blocking listening socket bound to `addr`
pub(crate) fn bind_listener(
    addr: SocketAddr,
    properties: &TcpServerSocketProperties,
) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(properties.reuse_address())?;
    if let Some(size) = properties.receive_buffer_size() {
        socket.set_recv_buffer_size(size as usize)?;
    }
    if let Some(size) = properties.send_buffer_size() {
        socket.set_send_buffer_size(size as usize)?;
    }

    // Tokio requires non-blocking sockets
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(properties.receive_backlog() as i32)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

/// Apply per-connection options to a freshly accepted socket
pub(crate) fn configure_accepted(
    stream: &TcpStream,
    properties: &TcpServerSocketProperties,
) -> io::Result<()> {
    stream.set_nodelay(properties.send_tcp_no_delay())?;

    let socket = SockRef::from(stream);
    socket.set_keepalive(properties.keep_alive())?;
    if let Some(linger) = properties.linger() {
        socket.set_linger(Some(linger))?;
    }
    if let Some(size) = properties.receive_buffer_size() {
        socket.set_recv_buffer_size(size as usize)?;
    }
    if let Some(size) = properties.send_buffer_size() {
        socket.set_send_buffer_size(size as usize)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_bind_applies_reuse_address() {
        let properties = TcpServerSocketProperties::default().with_reuse_address(true);
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), &properties).unwrap();

        let socket = SockRef::from(&listener);
        assert!(socket.reuse_address().unwrap());
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let properties = TcpServerSocketProperties::default().with_reuse_address(false);
        let first = bind_listener("127.0.0.1:0".parse().unwrap(), &properties).unwrap();
        let taken = first.local_addr().unwrap();

        let err = bind_listener(taken, &properties).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    }

    #[tokio::test]
    async fn test_accepted_socket_options() {
        let properties = TcpServerSocketProperties::default()
            .with_keep_alive(true)
            .with_send_tcp_no_delay(true)
            .with_linger(Duration::from_secs(1));
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), &properties).unwrap();
        let addr = listener.local_addr().unwrap();

        let _client = TcpStream::connect(addr).await.unwrap();
        let (accepted, _) = listener.accept().await.unwrap();
        configure_accepted(&accepted, &properties).unwrap();

        let socket = SockRef::from(&accepted);
        assert!(socket.keepalive().unwrap());
        assert!(accepted.nodelay().unwrap());
        assert_eq!(socket.linger().unwrap(), Some(Duration::from_secs(1)));
    }
}
