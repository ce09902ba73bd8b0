//! Error types for mtlssh

use std::io;

use thiserror::Error;

/// Result type alias for mtlssh
pub type Result<T> = std::result::Result<T, Error>;

/// mtlssh errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No key was selected before signing
    #[error("no private key selected for the certificate")]
    MissingKey,

    /// A non-CA certificate was requested without a parent to sign it
    #[error("non-CA certificate requires an issuer (parent certificate and key)")]
    MissingIssuer,

    /// Issuer certificate or key block is absent or malformed
    #[error("failed to decode issuer: {0}")]
    IssuerDecode(String),

    /// Decoded key algorithm is not ECDSA P-256 or RSA
    #[error("unsupported key type: {0}")]
    KeyTypeUnsupported(String),

    /// Certificate template violates an invariant
    #[error("invalid certificate template: {0}")]
    InvalidTemplate(String),

    /// A PEM bundle contributed no certificates to a trust pool
    #[error("failed to append certificates to {pool} pool: {reason}")]
    CertPoolAppend {
        /// Which pool was being populated
        pool: &'static str,
        /// Why nothing was appended
        reason: String,
    },

    /// Peer presented no certificates
    #[error("peer presented no certificates")]
    NoPeerCertificate,

    /// First certificate in the peer chain is missing or empty
    #[error("first peer certificate is empty")]
    NilFirstCertificate,

    /// Peer certificate was rejected by a verification policy
    #[error("peer verification failed: {0}")]
    Verification(String),

    /// TLS handshake failed
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    /// The server accept loop has already terminated
    #[error("accept loop terminated")]
    AcceptLoopTerminated,

    /// Certificate generation error
    #[error("Certificate generation error: {0}")]
    Generation(#[from] rcgen::Error),

    /// TLS library error
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Build a [`Error::Verification`] from any displayable reason.
    pub fn verification(reason: impl Into<String>) -> Self {
        Self::Verification(reason.into())
    }

    /// Whether this error was raised while deciding trust in a peer.
    #[must_use]
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::Verification(_) | Self::NoPeerCertificate | Self::NilFirstCertificate
        )
    }
}
