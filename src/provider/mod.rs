//! Cached listener provisioning
//!
//! The provider is the only owner allowed to create or destroy the listener
//! it hands out. Hosts feed it a [`ListenerConfig`], call
//! [`initialise`](TcpListenerProvider::initialise) once, and from then on
//! share the single listener returned by
//! [`connect`](TcpListenerProvider::connect).

pub mod config;
pub mod tcp_listener;

pub use config::{ListenerConfig, SocketSecurity};
pub use tcp_listener::TcpListenerProvider;
