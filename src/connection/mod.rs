//! Listener connections and the clients they accept

pub mod client;
pub mod listener;

pub use client::ClientConnection;
pub use listener::{ListenerConnection, ListenerState};
