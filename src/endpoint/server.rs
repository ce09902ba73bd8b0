//! mTLS server: listener, accept loop, and shutdown lifecycle.
//!
//! ```text
//! Created --listen()--> Listening --start()--> Accepting --shutdown()--> ShuttingDown --> Closed
//!    └──────────────── start() binds if needed ──┘
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use super::DEFAULT_ADDR;
use super::session::{ServerSession, Session};
use crate::tlsconf::TrustConfig;
use crate::{Error, Result};

/// Observable lifecycle of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Configured, no socket.
    Created,
    /// Listener bound, not accepting yet.
    Listening,
    /// Accept loop running.
    Accepting,
    /// Shutdown signalled, accept loop not yet gone.
    ShuttingDown,
    /// Listener closed; terminal.
    Closed,
}

/// A TCP connection accepted by the server, before the TLS handshake.
pub struct IncomingConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    acceptor: TlsAcceptor,
}

impl IncomingConnection {
    /// Remote socket address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Run the server side of the TLS handshake.
    ///
    /// # Errors
    ///
    /// [`Error::Handshake`] if the handshake or peer verification fails.
    pub async fn handshake(self) -> Result<ServerSession> {
        let tls = self.acceptor.accept(self.stream).await.map_err(|e| {
            debug!(peer = %self.peer_addr, error = %e, "Server handshake failed");
            Error::Handshake(e.to_string())
        })?;
        debug!(peer = %self.peer_addr, "Server handshake complete");
        Ok(Session::new(tls, self.peer_addr))
    }
}

impl std::fmt::Debug for IncomingConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingConnection")
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}

/// Handles one accepted connection, on its own task.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Take ownership of `conn`; failures stay inside this call.
    async fn handle(&self, conn: IncomingConnection);
}

#[async_trait]
impl<F, Fut> ConnectionHandler for F
where
    F: Fn(IncomingConnection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, conn: IncomingConnection) {
        (self)(conn).await;
    }
}

/// Handler used when none is configured: handshake, log the peer, close.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPeerHandler;

#[async_trait]
impl ConnectionHandler for LogPeerHandler {
    async fn handle(&self, conn: IncomingConnection) {
        let peer = conn.peer_addr();
        match conn.handshake().await {
            Ok(session) => match session.peer_identity() {
                Ok(id) => info!(peer = %peer, identity = %id, "Client authenticated"),
                Err(e) => warn!(peer = %peer, error = %e, "Client identity unavailable"),
            },
            Err(e) => warn!(peer = %peer, error = %e, "Handshake failed"),
        }
    }
}

/// One step of server configuration.
pub enum ServerOption {
    /// Listen address, `host:port`.
    Addr(String),
    /// Trust configuration; must carry an identity.
    Trust(TrustConfig),
    /// Per-connection handler.
    Handler(Arc<dyn ConnectionHandler>),
}

impl ServerOption {
    /// Wrap any handler.
    pub fn handler(handler: impl ConnectionHandler) -> Self {
        Self::Handler(Arc::new(handler))
    }
}

#[derive(Default)]
struct ServerOptions {
    addr: Option<String>,
    trust: Option<TrustConfig>,
    handler: Option<Arc<dyn ConnectionHandler>>,
}

/// mTLS server.
pub struct Server {
    addr: String,
    acceptor: TlsAcceptor,
    handler: Arc<dyn ConnectionHandler>,
    listener: Option<TcpListener>,
    local_addr: Option<SocketAddr>,
    state: Arc<watch::Sender<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
    accept_task: Option<JoinHandle<()>>,
}

impl Server {
    /// Create a server from `options`. No socket is opened.
    ///
    /// # Errors
    ///
    /// Fails without a trust configuration, or when it cannot be converted.
    pub fn new(options: impl IntoIterator<Item = ServerOption>) -> Result<Self> {
        let opts = options
            .into_iter()
            .fold(ServerOptions::default(), |mut o, opt| {
                match opt {
                    ServerOption::Addr(addr) => o.addr = Some(addr),
                    ServerOption::Trust(trust) => o.trust = Some(trust),
                    ServerOption::Handler(h) => o.handler = Some(h),
                }
                o
            });

        let trust = opts
            .trust
            .ok_or_else(|| Error::Config("server requires a trust configuration".into()))?;
        let acceptor = TlsAcceptor::from(trust.server_config()?);
        let (state, _) = watch::channel(ServerState::Created);
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            addr: opts.addr.unwrap_or_else(|| DEFAULT_ADDR.to_string()),
            acceptor,
            handler: opts.handler.unwrap_or_else(|| Arc::new(LogPeerHandler)),
            listener: None,
            local_addr: None,
            state: Arc::new(state),
            shutdown_tx,
            accept_task: None,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Bound address, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// [`Error::AcceptLoopTerminated`] after shutdown; I/O errors from binding.
    pub async fn listen(&mut self) -> Result<SocketAddr> {
        match self.state() {
            ServerState::ShuttingDown | ServerState::Closed => {
                return Err(Error::AcceptLoopTerminated);
            }
            ServerState::Listening | ServerState::Accepting => {
                if let Some(addr) = self.local_addr {
                    return Ok(addr);
                }
            }
            ServerState::Created => {}
        }

        let listener = TcpListener::bind(&self.addr).await?;
        let local = listener.local_addr()?;
        self.listener = Some(listener);
        self.local_addr = Some(local);
        self.state.send_replace(ServerState::Listening);
        info!(addr = %local, "Server listening");
        Ok(local)
    }

    /// Start the accept loop, binding first if needed.
    ///
    /// # Errors
    ///
    /// [`Error::AcceptLoopTerminated`] once the server has shut down.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        match self.state() {
            ServerState::ShuttingDown | ServerState::Closed => {
                return Err(Error::AcceptLoopTerminated);
            }
            ServerState::Accepting => {
                if let Some(addr) = self.local_addr {
                    return Ok(addr);
                }
            }
            ServerState::Created | ServerState::Listening => {}
        }

        let local = self.listen().await?;
        let listener = self.listener.take().ok_or(Error::AcceptLoopTerminated)?;

        self.state.send_replace(ServerState::Accepting);
        self.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            self.acceptor.clone(),
            Arc::clone(&self.handler),
            self.shutdown_tx.subscribe(),
            Arc::clone(&self.state),
        )));
        Ok(local)
    }

    /// Stop accepting and close the listener. In-flight handlers keep running.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&mut self) {
        match self.state() {
            ServerState::Closed => return,
            ServerState::Created | ServerState::Listening => {
                self.listener = None;
                self.state.send_replace(ServerState::Closed);
                info!("Server closed before accepting");
                return;
            }
            ServerState::Accepting | ServerState::ShuttingDown => {}
        }

        self.state.send_replace(ServerState::ShuttingDown);
        info!("Server shutting down");
        let _ = self.shutdown_tx.send(());

        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Accept loop task failed");
                self.state.send_replace(ServerState::Closed);
            }
        }
    }

    /// Resolve once the server reaches [`ServerState::Closed`].
    pub async fn closed(&self) {
        let mut rx = self.subscribe_state();
        let _ = rx.wait_for(|s| *s == ServerState::Closed).await;
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.addr)
            .field("local_addr", &self.local_addr)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Sequential accept → dispatch until shutdown, server drop, or accept error.
async fn accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    handler: Arc<dyn ConnectionHandler>,
    mut shutdown_rx: broadcast::Receiver<()>,
    state: Arc<watch::Sender<ServerState>>,
) {
    info!("Accept loop started");
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Accept loop stopping");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    debug!(peer = %peer_addr, "Accepted connection");
                    let conn = IncomingConnection {
                        stream,
                        peer_addr,
                        acceptor: acceptor.clone(),
                    };
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        handler.handle(conn).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept failed; stopping accept loop");
                    break;
                }
            }
        }
    }
    drop(listener);
    state.send_replace(ServerState::Closed);
    info!("Server closed");
}
