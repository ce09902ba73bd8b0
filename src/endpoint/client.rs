//! mTLS client: dial, then handshake.

use std::net::SocketAddr;

use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::DEFAULT_ADDR;
use super::session::{ClientSession, Session};
use crate::tlsconf::TrustConfig;
use crate::{Error, Result};

/// One step of client configuration.
#[derive(Debug)]
pub enum ClientOption {
    /// Address to dial, `host:port`.
    Addr(String),
    /// Trust configuration.
    Trust(TrustConfig),
    /// TLS server name; defaults to the host part of the address.
    ServerName(String),
}

/// mTLS client.
#[derive(Clone)]
pub struct Client {
    addr: String,
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl Client {
    /// Create a client from `options`. Nothing is dialed.
    ///
    /// # Errors
    ///
    /// Fails without a trust configuration, when it cannot be converted, or
    /// when the server name is not a valid DNS name or IP address.
    pub fn new(options: impl IntoIterator<Item = ClientOption>) -> Result<Self> {
        let mut addr = None;
        let mut trust = None;
        let mut name = None;
        for opt in options {
            match opt {
                ClientOption::Addr(a) => addr = Some(a),
                ClientOption::Trust(t) => trust = Some(t),
                ClientOption::ServerName(n) => name = Some(n),
            }
        }

        let addr = addr.unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let trust =
            trust.ok_or_else(|| Error::Config("client requires a trust configuration".into()))?;
        let name = name.unwrap_or_else(|| host_of(&addr).to_string());
        let server_name = ServerName::try_from(name.clone())
            .map_err(|e| Error::Config(format!("Invalid server name '{name}': {e}")))?;

        Ok(Self {
            addr,
            connector: TlsConnector::from(trust.client_config()?),
            server_name,
        })
    }

    /// Address this client dials.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Name the server certificate is checked against.
    pub fn server_name(&self) -> &ServerName<'static> {
        &self.server_name
    }

    /// Open the TCP connection. No TLS yet.
    pub async fn dial(&self) -> Result<DialedConnection> {
        let stream = TcpStream::connect(&self.addr).await?;
        let peer_addr = stream.peer_addr()?;
        debug!(addr = %peer_addr, "Dialed server");
        Ok(DialedConnection {
            stream,
            peer_addr,
            connector: self.connector.clone(),
            server_name: self.server_name.clone(),
        })
    }

    /// Dial and handshake in one step.
    pub async fn connect(&self) -> Result<ClientSession> {
        self.dial().await?.handshake().await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("addr", &self.addr)
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

/// A TCP connection to the server, before the TLS handshake.
pub struct DialedConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl DialedConnection {
    /// Remote socket address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Run the client side of the TLS handshake.
    ///
    /// # Errors
    ///
    /// [`Error::Handshake`] if the handshake or server verification fails.
    pub async fn handshake(self) -> Result<ClientSession> {
        let tls = self
            .connector
            .connect(self.server_name, self.stream)
            .await
            .map_err(|e| {
                debug!(peer = %self.peer_addr, error = %e, "Client handshake failed");
                Error::Handshake(e.to_string())
            })?;
        debug!(peer = %self.peer_addr, "Client handshake complete");
        Ok(Session::new(tls, self.peer_addr))
    }
}

impl std::fmt::Debug for DialedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialedConnection")
            .field("peer_addr", &self.peer_addr)
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

/// Host part of `host:port`, with IPv6 brackets removed.
fn host_of(addr: &str) -> &str {
    let host = addr.rsplit_once(':').map_or(addr, |(host, _)| host);
    host.trim_start_matches('[').trim_end_matches(']')
}
