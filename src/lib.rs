//! mtlssh Library
//!
//! Private mutual-TLS trust domain: mint a certificate authority, issue client
//! and server leaves under it, turn them into enforceable TLS trust
//! configurations, and run authenticated endpoints.
//!
//! # Features
//!
//! - **Composable issuance**: ordered certificate options, last one wins
//! - **Trust configuration**: CA pools, protocol policy, mutual authentication
//! - **Pluggable verification**: named peer-verification policies and custom predicates
//! - **Endpoints**: server accept loop with shutdown, client dial + handshake
//! - **Proxy**: terminate mTLS and forward to a plain TCP upstream

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cert;
pub mod cli;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod identity;
pub mod proxy;
pub mod tlsconf;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so the client can use stdout for session data.
    match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    }
    .map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))
}
