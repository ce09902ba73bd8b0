//! Certificate authority: self-signed roots and the leaves they sign.

use std::fmt;

use rcgen::{Issuer, KeyPair};
use rustls::pki_types::CertificateDer;
use rustls::pki_types::pem::PemObject;
use tracing::info;
use x509_parser::prelude::*;

use super::builder::{GeneratedCert, issue};
use super::key::{KeyAlgorithm, KeyMaterial};
use super::options::{
    CertOption, is_ca, is_client, is_server, with_common_name, with_new_ecdsa_key, with_parent,
};
use crate::{Error, Result};

/// Subject common name of a CA issued without one.
pub const DEFAULT_CA_COMMON_NAME: &str = "ssh.ca.name";
/// Subject common name of a server leaf issued without one.
pub const DEFAULT_SERVER_COMMON_NAME: &str = "ssh.server.name";
/// Subject common name of a client leaf issued without one.
pub const DEFAULT_CLIENT_COMMON_NAME: &str = "ssh.client.name";

/// A decoded issuer: CA certificate plus the key that signs under it.
///
/// Only constructible through [`Signer::from_pem`], so holding one means the
/// issuer was fully decoded.
pub struct Signer {
    issuer: Issuer<'static, KeyPair>,
    algorithm: KeyAlgorithm,
    common_name: Option<String>,
}

impl Signer {
    /// Decode an issuer from its PKCS#8 or SEC1 key PEM and certificate PEM.
    ///
    /// # Errors
    ///
    /// - [`Error::IssuerDecode`] if either buffer holds no usable block, or
    ///   the key does not belong to the certificate.
    /// - [`Error::KeyTypeUnsupported`] if the key is neither ECDSA P-256 nor RSA.
    pub fn from_pem(key_pem: &[u8], cert_pem: &[u8]) -> Result<Self> {
        let cert_der = CertificateDer::pem_slice_iter(cert_pem)
            .next()
            .ok_or_else(|| Error::IssuerDecode("no CERTIFICATE block found".into()))?
            .map_err(|e| Error::IssuerDecode(format!("failed to parse issuer certificate: {e}")))?;

        let key = KeyMaterial::from_pem(key_pem)?;
        let algorithm = key.algorithm();

        let (_, parsed) = X509Certificate::from_der(&cert_der)
            .map_err(|e| Error::IssuerDecode(format!("malformed issuer certificate: {e}")))?;
        if parsed.public_key().raw != key.public_key_der().as_slice() {
            return Err(Error::IssuerDecode(
                "issuer key does not match issuer certificate".into(),
            ));
        }
        let common_name = parsed
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);

        let issuer = Issuer::from_ca_cert_der(&cert_der, key.into_key_pair())
            .map_err(|e| Error::IssuerDecode(format!("failed to load issuer: {e}")))?;

        Ok(Self {
            issuer,
            algorithm,
            common_name,
        })
    }

    /// Algorithm of the signing key.
    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// Subject common name of the issuer, if it has one.
    #[must_use]
    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    pub(crate) fn issuer(&self) -> &Issuer<'static, KeyPair> {
        &self.issuer
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("common_name", &self.common_name)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Issue a self-signed CA.
///
/// Starts from the CA preset with a fresh ECDSA key and
/// [`DEFAULT_CA_COMMON_NAME`]; `options` are applied afterwards and may
/// replace any of them.
pub fn new_ca(options: impl IntoIterator<Item = CertOption>) -> Result<GeneratedCert> {
    let ca = issue(
        [is_ca(), with_new_ecdsa_key(), with_common_name(DEFAULT_CA_COMMON_NAME)]
            .into_iter()
            .chain(options),
    )?;
    info!("Issued certificate authority");
    Ok(ca)
}

/// Issue a client leaf signed by the issuer in `issuer_key_pem` / `issuer_cert_pem`.
pub fn new_client_from_ca(
    issuer_key_pem: &[u8],
    issuer_cert_pem: &[u8],
    options: impl IntoIterator<Item = CertOption>,
) -> Result<GeneratedCert> {
    new_leaf_from_ca(
        issuer_key_pem,
        issuer_cert_pem,
        is_client(),
        DEFAULT_CLIENT_COMMON_NAME,
        options,
    )
}

/// Issue a server leaf signed by the issuer in `issuer_key_pem` / `issuer_cert_pem`.
pub fn new_server_from_ca(
    issuer_key_pem: &[u8],
    issuer_cert_pem: &[u8],
    options: impl IntoIterator<Item = CertOption>,
) -> Result<GeneratedCert> {
    new_leaf_from_ca(
        issuer_key_pem,
        issuer_cert_pem,
        is_server(),
        DEFAULT_SERVER_COMMON_NAME,
        options,
    )
}

fn new_leaf_from_ca(
    issuer_key_pem: &[u8],
    issuer_cert_pem: &[u8],
    role: CertOption,
    default_cn: &str,
    options: impl IntoIterator<Item = CertOption>,
) -> Result<GeneratedCert> {
    let signer = Signer::from_pem(issuer_key_pem, issuer_cert_pem)?;
    let role_name = format!("{role:?}");
    let leaf = issue(
        [
            with_parent(signer),
            with_new_ecdsa_key(),
            role,
            with_common_name(default_cn),
        ]
        .into_iter()
        .chain(options),
    )?;
    info!(role = %role_name, "Issued leaf certificate");
    Ok(leaf)
}
