//! Server and client endpoints built from a [`TrustConfig`](crate::tlsconf::TrustConfig).
//!
//! Peer certificates can only be inspected on a [`Session`], which exists
//! only after a completed handshake.

pub mod client;
pub mod server;
pub mod session;

pub use client::{Client, ClientOption, DialedConnection};
pub use server::{
    ConnectionHandler, IncomingConnection, LogPeerHandler, Server, ServerOption, ServerState,
};
pub use session::{ClientSession, ServerSession, Session, Side};

/// Default listen / dial address.
pub const DEFAULT_ADDR: &str = "127.0.0.1:2222";
