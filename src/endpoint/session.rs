//! Authenticated sessions, available only after a completed handshake.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use rustls::SupportedCipherSuite;
use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsStream;

use crate::identity::PeerIdentity;
use crate::{Error, Result};

/// Which end of the connection a session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Accepted by a [`Server`](super::Server).
    Server,
    /// Dialed by a [`Client`](super::Client).
    Client,
}

/// A TLS session over TCP after a successful handshake.
pub struct Session {
    stream: TlsStream<TcpStream>,
    peer_addr: SocketAddr,
}

/// Session accepted by a server.
pub type ServerSession = Session;
/// Session dialed by a client.
pub type ClientSession = Session;

impl Session {
    pub(crate) fn new(stream: impl Into<TlsStream<TcpStream>>, peer_addr: SocketAddr) -> Self {
        Self {
            stream: stream.into(),
            peer_addr,
        }
    }

    /// Which end this session is.
    pub fn side(&self) -> Side {
        match self.stream {
            TlsStream::Server(_) => Side::Server,
            TlsStream::Client(_) => Side::Client,
        }
    }

    /// Remote socket address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// The chain the peer presented, end-entity first.
    pub fn peer_certificates(&self) -> Option<&[CertificateDer<'static>]> {
        self.stream.get_ref().1.peer_certificates()
    }

    /// Identity of the peer's end-entity certificate.
    ///
    /// # Errors
    ///
    /// [`Error::NoPeerCertificate`] if the peer presented none.
    pub fn peer_identity(&self) -> Result<PeerIdentity> {
        let first = self
            .peer_certificates()
            .and_then(<[_]>::first)
            .ok_or(Error::NoPeerCertificate)?;
        PeerIdentity::from_der(first)
    }

    /// Negotiated protocol version.
    pub fn protocol_version(&self) -> Option<rustls::ProtocolVersion> {
        self.stream.get_ref().1.protocol_version()
    }

    /// Negotiated cipher suite.
    pub fn cipher_suite(&self) -> Option<SupportedCipherSuite> {
        self.stream.get_ref().1.negotiated_cipher_suite()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("side", &self.side())
            .field("peer_addr", &self.peer_addr)
            .field("protocol_version", &self.protocol_version())
            .finish_non_exhaustive()
    }
}

impl AsyncRead for Session {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for Session {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}
