//! Signing: turns an option list into a certificate + private key pair.

use tracing::debug;

use super::options::{CertOption, apply_all};
use crate::{Error, Result};

/// Generated certificate and key pair in PEM format.
#[derive(Debug, Clone)]
pub struct GeneratedCert {
    /// PEM-encoded certificate (`CERTIFICATE`).
    pub cert_pem: String,
    /// PEM-encoded PKCS#8 private key (`PRIVATE KEY`).
    pub key_pem: String,
}

impl GeneratedCert {
    /// Load this pair back as an issuer for further leaves.
    pub fn to_signer(&self) -> Result<super::Signer> {
        super::Signer::from_pem(self.key_pem.as_bytes(), self.cert_pem.as_bytes())
    }
}

/// Issue a certificate from `options`, applied in order.
///
/// Self-signs when the resulting template is a CA, otherwise signs with the
/// parent supplied through [`CertOption::Parent`].
///
/// # Errors
///
/// - [`Error::MissingKey`] if no option selected a key.
/// - [`Error::MissingIssuer`] for a non-CA template without a parent.
/// - [`Error::InvalidTemplate`] if the template invariants do not hold.
/// - any error raised by an individual option.
pub fn issue(options: impl IntoIterator<Item = CertOption>) -> Result<GeneratedCert> {
    let state = apply_all(options)?;
    let key = state.key.ok_or(Error::MissingKey)?;
    let template = state.template;
    template.validate()?;

    let params = template.to_params()?;
    let cert = if template.is_ca {
        params.self_signed(key.key_pair())?
    } else {
        let parent = state.parent.ok_or(Error::MissingIssuer)?;
        debug!(
            issuer = parent.common_name().unwrap_or("<unnamed>"),
            subject = template.common_name.as_deref().unwrap_or("<unnamed>"),
            "Signing leaf certificate"
        );
        params.signed_by(key.key_pair(), parent.issuer())?
    };

    debug!(
        serial = %hex::encode(template.serial_bytes()),
        algorithm = %key.algorithm(),
        is_ca = template.is_ca,
        "Certificate issued"
    );

    Ok(GeneratedCert {
        cert_pem: cert.pem(),
        key_pem: key.to_pem(),
    })
}
