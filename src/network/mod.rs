//! Listener addressing and socket tuning

pub mod address;
pub mod properties;

pub use address::SocketConnectionSettings;
pub use properties::TcpServerSocketProperties;
