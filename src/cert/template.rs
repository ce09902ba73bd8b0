//! Certificate template: the policy fields of a certificate before signing.

use std::net::IpAddr;

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyUsagePurpose, SanType, SerialNumber, string::Ia5String,
};
use time::{Duration, OffsetDateTime};

use crate::{Error, Result};

/// Default validity window, in years from issuance.
pub const DEFAULT_VALIDITY_YEARS: i32 = 10;

/// In-memory description of a to-be-issued certificate.
///
/// Created with [`CertificateTemplate::new`] defaults, mutated by
/// [`CertOption`](super::CertOption)s, consumed once at signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateTemplate {
    /// 128-bit random serial number.
    pub serial: u128,
    /// Subject common name.
    pub common_name: Option<String>,
    /// Start of the validity window (inclusive).
    pub not_before: OffsetDateTime,
    /// End of the validity window.
    pub not_after: OffsetDateTime,
    /// Key usage flags.
    pub key_usages: Vec<KeyUsagePurpose>,
    /// Extended key usages.
    pub extended_key_usages: Vec<ExtendedKeyUsagePurpose>,
    /// Whether this certificate may sign other certificates.
    pub is_ca: bool,
    /// Whether the basic constraints extension is emitted.
    pub basic_constraints_valid: bool,
    /// Subject Alternative Names, DNS entries.
    pub dns_names: Vec<String>,
    /// Subject Alternative Names, IP entries.
    pub ip_addresses: Vec<IpAddr>,
}

impl CertificateTemplate {
    /// Template with safe defaults: non-CA, digital signature only, no
    /// extended usages, valid for ten years from now, fresh serial.
    #[must_use]
    pub fn new() -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            serial: generate_serial_number(),
            common_name: None,
            not_before: now,
            not_after: add_years(now, DEFAULT_VALIDITY_YEARS),
            key_usages: vec![KeyUsagePurpose::DigitalSignature],
            extended_key_usages: Vec::new(),
            is_ca: false,
            basic_constraints_valid: true,
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
        }
    }

    /// Restart the validity window at now and make it last `duration`.
    pub fn set_valid_for(&mut self, duration: std::time::Duration) -> Result<()> {
        let duration = Duration::try_from(duration)
            .map_err(|e| Error::InvalidTemplate(format!("validity out of range: {e}")))?;
        let now = OffsetDateTime::now_utc();
        self.not_before = now;
        self.not_after = now
            .checked_add(duration)
            .ok_or_else(|| Error::InvalidTemplate("validity overflows the calendar".into()))?;
        Ok(())
    }

    /// Check the invariants that must hold at signing time.
    pub fn validate(&self) -> Result<()> {
        if self.not_before >= self.not_after {
            return Err(Error::InvalidTemplate(format!(
                "not_before ({}) must be earlier than not_after ({})",
                self.not_before, self.not_after
            )));
        }
        if self.is_ca && !self.key_usages.contains(&KeyUsagePurpose::KeyCertSign) {
            return Err(Error::InvalidTemplate(
                "CA certificate must include the certificate-signing key usage".into(),
            ));
        }
        Ok(())
    }

    /// Serial number as big-endian bytes without leading zeros.
    #[must_use]
    pub fn serial_bytes(&self) -> Vec<u8> {
        let bytes = self.serial.to_be_bytes();
        let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
        bytes[first..].to_vec()
    }

    /// Lower the template into `rcgen` certificate parameters.
    pub(crate) fn to_params(&self) -> Result<CertificateParams> {
        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        if let Some(cn) = &self.common_name {
            dn.push(DnType::CommonName, cn.as_str());
        }
        params.distinguished_name = dn;

        params.serial_number = Some(SerialNumber::from(self.serial_bytes()));
        params.not_before = self.not_before;
        params.not_after = self.not_after;
        params.key_usages.clone_from(&self.key_usages);
        params.extended_key_usages.clone_from(&self.extended_key_usages);
        params.is_ca = match (self.is_ca, self.basic_constraints_valid) {
            (true, _) => IsCa::Ca(BasicConstraints::Unconstrained),
            (false, true) => IsCa::ExplicitNoCa,
            (false, false) => IsCa::NoCa,
        };

        let mut sans = Vec::with_capacity(self.dns_names.len() + self.ip_addresses.len());
        for dns in &self.dns_names {
            let ia5 = Ia5String::try_from(dns.as_str())
                .map_err(|e| Error::InvalidTemplate(format!("invalid DNS SAN '{dns}': {e}")))?;
            sans.push(SanType::DnsName(ia5));
        }
        sans.extend(self.ip_addresses.iter().copied().map(SanType::IpAddress));
        params.subject_alt_names = sans;

        Ok(params)
    }
}

impl Default for CertificateTemplate {
    fn default() -> Self {
        Self::new()
    }
}

/// Draw a uniformly random 128-bit certificate serial number.
#[must_use]
pub fn generate_serial_number() -> u128 {
    rand::random::<u128>()
}

/// Calendar-aware year addition; Feb 29 falls back to Feb 28.
fn add_years(at: OffsetDateTime, years: i32) -> OffsetDateTime {
    let year = at.year() + years;
    at.replace_year(year)
        .or_else(|_| at.replace_day(28).and_then(|d| d.replace_year(year)))
        .unwrap_or(at + Duration::days(365 * i64::from(years)))
}
