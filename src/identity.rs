//! Peer identity extraction.
//!
//! Parses an X.509 DER-encoded certificate and extracts the fields endpoints
//! log and expose after a handshake: Common Name, Organisational Unit, issuer
//! CN, serial, SAN DNS names and SAN IPs.

use std::fmt;
use std::net::IpAddr;

use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Peer identity
// ─────────────────────────────────────────────────────────────────────────────

/// Identity fields of a peer's end-entity certificate.
///
/// All name fields are optional because not every certificate uses every
/// field. `display_name` is computed once for logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Subject Common Name (CN).
    pub common_name: Option<String>,

    /// First Organisational Unit (OU) in the subject.
    pub organizational_unit: Option<String>,

    /// Issuer Common Name.
    pub issuer_common_name: Option<String>,

    /// Serial number, lowercase hex.
    pub serial_hex: String,

    /// Subject Alternative Name DNS entries.
    pub san_dns_names: Vec<String>,

    /// Subject Alternative Name IP entries.
    pub san_ips: Vec<IpAddr>,

    /// Whether the certificate is a CA.
    pub is_ca: bool,

    /// Pre-computed human-readable label for logs.
    pub display_name: String,
}

impl PeerIdentity {
    /// Parse a DER-encoded certificate and extract its identity fields.
    ///
    /// # Errors
    ///
    /// Returns `Error::Verification` if the certificate cannot be parsed.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::verification(format!("Failed to parse peer certificate: {e}")))?;

        let common_name = extract_cn(&cert);
        let organizational_unit = extract_ou(&cert);
        let issuer_common_name = extract_issuer_cn(&cert);
        let (san_dns_names, san_ips) = extract_sans(&cert);
        let display_name = build_display_name(common_name.as_ref(), &san_dns_names);

        Ok(Self {
            common_name,
            organizational_unit,
            issuer_common_name,
            serial_hex: hex::encode(cert.raw_serial()),
            san_dns_names,
            san_ips,
            is_ca: cert.is_ca(),
            display_name,
        })
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Extract the CN attribute from the subject DN.
fn extract_cn(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
}

/// Extract the first OU attribute from the subject DN.
fn extract_ou(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_organizational_unit()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
}

fn extract_issuer_cn(cert: &X509Certificate<'_>) -> Option<String> {
    cert.issuer()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
}

/// Extract SAN DNS and IP entries from the certificate extensions.
fn extract_sans(cert: &X509Certificate<'_>) -> (Vec<String>, Vec<IpAddr>) {
    let mut dns_names = Vec::new();
    let mut ips = Vec::new();

    if let Ok(Some(san_ext)) = cert.subject_alternative_name() {
        for name in &san_ext.value.general_names {
            match name {
                GeneralName::DNSName(dns) => dns_names.push((*dns).to_owned()),
                GeneralName::IPAddress(raw) => {
                    if let Some(ip) = ip_from_bytes(raw) {
                        ips.push(ip);
                    }
                }
                _ => {}
            }
        }
    }

    (dns_names, ips)
}

fn ip_from_bytes(raw: &[u8]) -> Option<IpAddr> {
    match raw.len() {
        4 => <[u8; 4]>::try_from(raw).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(raw).ok().map(IpAddr::from),
        _ => None,
    }
}

/// Prefers CN, then the first DNS SAN, then `"<unknown>"`.
fn build_display_name(cn: Option<&String>, san_dns: &[String]) -> String {
    cn.or_else(|| san_dns.first())
        .map_or("<unknown>", String::as_str)
        .to_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
