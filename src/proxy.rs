//! mTLS-terminating TCP proxy.
//!
//! Each authenticated session is forwarded to a plain TCP upstream, e.g. a
//! local sshd, with `tokio::io::copy_bidirectional`.

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::endpoint::{ConnectionHandler, IncomingConnection, Server, ServerOption};
use crate::tlsconf::TrustConfig;
use crate::Result;

/// Handler forwarding every authenticated session to `upstream`.
#[derive(Debug, Clone)]
pub struct ForwardHandler {
    upstream: String,
}

impl ForwardHandler {
    /// Forward to `upstream` (`host:port`).
    pub fn new(upstream: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into(),
        }
    }
}

#[async_trait]
impl ConnectionHandler for ForwardHandler {
    async fn handle(&self, conn: IncomingConnection) {
        let peer = conn.peer_addr();
        let mut session = match conn.handshake().await {
            Ok(s) => s,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Proxy handshake failed");
                return;
            }
        };
        let identity = session
            .peer_identity()
            .map_or_else(|_| "<unknown>".to_string(), |id| id.display_name);

        let mut upstream = match TcpStream::connect(&self.upstream).await {
            Ok(s) => s,
            Err(e) => {
                warn!(upstream = %self.upstream, error = %e, "Upstream connect failed");
                return;
            }
        };
        info!(peer = %peer, identity = %identity, upstream = %self.upstream, "Forwarding session");

        match tokio::io::copy_bidirectional(&mut session, &mut upstream).await {
            Ok((to_upstream, to_client)) => {
                debug!(peer = %peer, to_upstream, to_client, "Session closed");
            }
            Err(e) => debug!(peer = %peer, error = %e, "Session ended with error"),
        }
    }
}

/// Build a server that terminates mTLS on `listen_addr` and forwards to
/// `upstream_addr`.
pub fn new_proxy_server(
    listen_addr: impl Into<String>,
    upstream_addr: impl Into<String>,
    trust: TrustConfig,
) -> Result<Server> {
    Server::new([
        ServerOption::Addr(listen_addr.into()),
        ServerOption::Trust(trust),
        ServerOption::handler(ForwardHandler::new(upstream_addr)),
    ])
}
