//! Composable certificate options.
//!
//! An issuance is described by an ordered list of [`CertOption`]s. Each option
//! is a step `IssuanceState -> Result<IssuanceState>`; [`apply_all`] folds the
//! list over a fresh state and stops at the first error. Options touching the
//! same field override each other, last one wins, so callers can start from a
//! role preset and then refine it.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use rcgen::{ExtendedKeyUsagePurpose, KeyUsagePurpose};

use super::authority::Signer;
use super::key::KeyMaterial;
use super::template::CertificateTemplate;
use crate::Result;

/// Everything an issuance accumulates before signing.
#[derive(Debug)]
pub struct IssuanceState {
    /// Policy fields of the certificate.
    pub template: CertificateTemplate,
    /// Key of the subject; required before signing.
    pub key: Option<KeyMaterial>,
    /// Issuer; required unless the template is a CA.
    pub parent: Option<Signer>,
}

impl IssuanceState {
    /// State with a default template and no key or parent.
    #[must_use]
    pub fn new() -> Self {
        Self {
            template: CertificateTemplate::new(),
            key: None,
            parent: None,
        }
    }
}

impl Default for IssuanceState {
    fn default() -> Self {
        Self::new()
    }
}

/// One step of certificate configuration.
pub enum CertOption {
    /// Sign with this issuer.
    Parent(Signer),
    /// Use this key for the subject.
    Key(KeyMaterial),
    /// Generate a fresh ECDSA P-256 key for the subject.
    NewEcdsaKey,
    /// Generate a fresh RSA key for the subject.
    NewRsaKey,
    /// Self-signing CA shape.
    IsCa,
    /// Server leaf shape.
    IsServer,
    /// Client leaf shape.
    IsClient,
    /// Restart validity at now and keep it for this long.
    ValidFor(Duration),
    /// Subject common name.
    CommonName(String),
    /// DNS Subject Alternative Names (replaces any set earlier).
    DnsNames(Vec<String>),
    /// IP Subject Alternative Names (replaces any set earlier).
    IpAddresses(Vec<IpAddr>),
}

impl CertOption {
    /// Apply this option to `state`.
    pub fn apply(self, mut state: IssuanceState) -> Result<IssuanceState> {
        let t = &mut state.template;
        match self {
            Self::Parent(signer) => state.parent = Some(signer),
            Self::Key(key) => state.key = Some(key),
            Self::NewEcdsaKey => state.key = Some(KeyMaterial::generate_ecdsa()?),
            Self::NewRsaKey => state.key = Some(KeyMaterial::generate_rsa()?),
            Self::IsCa => {
                t.is_ca = true;
                t.key_usages = vec![
                    KeyUsagePurpose::KeyEncipherment,
                    KeyUsagePurpose::DigitalSignature,
                    KeyUsagePurpose::KeyCertSign,
                ];
                t.extended_key_usages = vec![
                    ExtendedKeyUsagePurpose::ClientAuth,
                    ExtendedKeyUsagePurpose::ServerAuth,
                ];
            }
            Self::IsServer => {
                t.is_ca = false;
                t.key_usages = vec![KeyUsagePurpose::DigitalSignature];
                t.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
            }
            Self::IsClient => {
                t.is_ca = false;
                t.key_usages = vec![KeyUsagePurpose::DigitalSignature];
                t.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
            }
            Self::ValidFor(duration) => t.set_valid_for(duration)?,
            Self::CommonName(name) => t.common_name = Some(name),
            Self::DnsNames(names) => t.dns_names = names,
            Self::IpAddresses(ips) => t.ip_addresses = ips,
        }
        Ok(state)
    }
}

impl fmt::Debug for CertOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parent(signer) => f.debug_tuple("Parent").field(signer).finish(),
            Self::Key(key) => f.debug_tuple("Key").field(key).finish(),
            Self::NewEcdsaKey => f.write_str("NewEcdsaKey"),
            Self::NewRsaKey => f.write_str("NewRsaKey"),
            Self::IsCa => f.write_str("IsCa"),
            Self::IsServer => f.write_str("IsServer"),
            Self::IsClient => f.write_str("IsClient"),
            Self::ValidFor(d) => f.debug_tuple("ValidFor").field(d).finish(),
            Self::CommonName(n) => f.debug_tuple("CommonName").field(n).finish(),
            Self::DnsNames(n) => f.debug_tuple("DnsNames").field(n).finish(),
            Self::IpAddresses(ips) => f.debug_tuple("IpAddresses").field(ips).finish(),
        }
    }
}

/// Fold `options` over a fresh [`IssuanceState`], in order.
pub fn apply_all(options: impl IntoIterator<Item = CertOption>) -> Result<IssuanceState> {
    options
        .into_iter()
        .try_fold(IssuanceState::new(), |state, opt| opt.apply(state))
}

/// Sign with `signer` instead of self-signing.
pub fn with_parent(signer: Signer) -> CertOption {
    CertOption::Parent(signer)
}

/// Use a caller-supplied key.
pub fn with_key(key: KeyMaterial) -> CertOption {
    CertOption::Key(key)
}

/// Generate a fresh ECDSA P-256 key.
pub fn with_new_ecdsa_key() -> CertOption {
    CertOption::NewEcdsaKey
}

/// Generate a fresh RSA key.
pub fn with_new_rsa_key() -> CertOption {
    CertOption::NewRsaKey
}

/// Self-signing certificate authority: cert-sign + digital-signature usage,
/// client and server extended usage.
pub fn is_ca() -> CertOption {
    CertOption::IsCa
}

/// Server leaf: server-auth extended usage only.
pub fn is_server() -> CertOption {
    CertOption::IsServer
}

/// Client leaf: client-auth extended usage only.
pub fn is_client() -> CertOption {
    CertOption::IsClient
}

/// Validity window starting now.
pub fn is_valid_for(duration: Duration) -> CertOption {
    CertOption::ValidFor(duration)
}

/// Subject common name.
pub fn with_common_name(name: impl Into<String>) -> CertOption {
    CertOption::CommonName(name.into())
}

/// DNS Subject Alternative Names.
pub fn with_dns_names<I, S>(names: I) -> CertOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CertOption::DnsNames(names.into_iter().map(Into::into).collect())
}

/// IP Subject Alternative Names.
pub fn with_ip_addresses(ips: impl IntoIterator<Item = IpAddr>) -> CertOption {
    CertOption::IpAddresses(ips.into_iter().collect())
}
