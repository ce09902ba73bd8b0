//! Asymmetric key material for certificate issuance.
//!
//! Two algorithms are supported: ECDSA over P-256 (the default) and RSA.
//! The algorithm is a variant of [`KeyMaterial`], so every place that needs
//! algorithm-specific behaviour matches exhaustively.

use std::fmt;

use rcgen::{KeyPair, PKCS_ECDSA_P256_SHA256, PKCS_RSA_SHA256, PublicKeyData, SignatureAlgorithm};
use rustls::pki_types::PrivateKeyDer;
use rustls::pki_types::pem::PemObject;

use crate::{Error, Result};

/// Supported key algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// ECDSA over NIST P-256 with SHA-256.
    EcdsaP256,
    /// RSA (2048-bit when generated) with PKCS#1 v1.5 SHA-256 signatures.
    Rsa,
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EcdsaP256 => f.write_str("ECDSA-P256"),
            Self::Rsa => f.write_str("RSA"),
        }
    }
}

/// A private key and its derived public key.
pub enum KeyMaterial {
    /// ECDSA P-256 key pair.
    EcdsaP256(KeyPair),
    /// RSA key pair.
    Rsa(KeyPair),
}

impl KeyMaterial {
    /// Generate a fresh ECDSA P-256 key pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the crypto backend fails to generate the key.
    pub fn generate_ecdsa() -> Result<Self> {
        Ok(Self::EcdsaP256(KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)?))
    }

    /// Generate a fresh RSA key pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the crypto backend fails to generate the key.
    pub fn generate_rsa() -> Result<Self> {
        Ok(Self::Rsa(KeyPair::generate_for(&PKCS_RSA_SHA256)?))
    }

    /// Decode a PEM-encoded PKCS#8 or SEC1 private key.
    ///
    /// A missing or unparsable key block is an [`Error::IssuerDecode`]; a key
    /// that parses but uses another algorithm is [`Error::KeyTypeUnsupported`].
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        // Fail closed before handing the bytes to the signing backend.
        PrivateKeyDer::from_pem_slice(pem)
            .map_err(|e| Error::IssuerDecode(format!("no private key block found: {e}")))?;

        let pem_str = std::str::from_utf8(pem)
            .map_err(|e| Error::IssuerDecode(format!("private key is not valid UTF-8: {e}")))?;
        let key_pair = KeyPair::from_pem(pem_str)
            .map_err(|e| Error::IssuerDecode(format!("failed to parse private key: {e}")))?;

        Self::from_key_pair(key_pair)
    }

    /// Classify an already-loaded key pair.
    pub fn from_key_pair(key_pair: KeyPair) -> Result<Self> {
        let alg = key_pair.algorithm();
        if alg == &PKCS_ECDSA_P256_SHA256 {
            Ok(Self::EcdsaP256(key_pair))
        } else if alg == &PKCS_RSA_SHA256 {
            Ok(Self::Rsa(key_pair))
        } else {
            Err(Error::KeyTypeUnsupported(format!("{alg:?}")))
        }
    }

    /// Which algorithm this key uses.
    #[must_use]
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            Self::EcdsaP256(_) => KeyAlgorithm::EcdsaP256,
            Self::Rsa(_) => KeyAlgorithm::Rsa,
        }
    }

    /// Signature algorithm used when this key signs a certificate.
    #[must_use]
    pub fn signature_algorithm(&self) -> &'static SignatureAlgorithm {
        match self {
            Self::EcdsaP256(_) => &PKCS_ECDSA_P256_SHA256,
            Self::Rsa(_) => &PKCS_RSA_SHA256,
        }
    }

    /// DER-encoded SubjectPublicKeyInfo, derived from the private key.
    #[must_use]
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key_pair().subject_public_key_info()
    }

    /// PKCS#8 `PRIVATE KEY` PEM block.
    #[must_use]
    pub fn to_pem(&self) -> String {
        self.key_pair().serialize_pem()
    }

    /// Borrow the underlying signing key.
    #[must_use]
    pub fn key_pair(&self) -> &KeyPair {
        match self {
            Self::EcdsaP256(kp) | Self::Rsa(kp) => kp,
        }
    }

    pub(crate) fn into_key_pair(self) -> KeyPair {
        match self {
            Self::EcdsaP256(kp) | Self::Rsa(kp) => kp,
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print private key bytes.
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}
