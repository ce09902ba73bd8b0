//! Certificate issuance for a private mTLS trust domain.
//!
//! ```text
//! [CertOption, ...] --fold--> IssuanceState { template, key, parent }
//!                                  │
//!                   is_ca? ── yes ─┴─ no ──> signed by parent
//!                     │
//!                self-signed
//! ```
//!
//! # Modules
//!
//! - [`key`]: ECDSA P-256 / RSA key material
//! - [`template`]: policy fields of a to-be-signed certificate
//! - [`options`]: the composable option steps and role presets
//! - [`builder`]: signing and PEM encoding
//! - [`authority`]: issuer decoding and CA / leaf flows
//! - [`files`]: `<prefix>.cert.pem` / `<prefix>.priv.key.pem` persistence

pub mod authority;
pub mod builder;
pub mod files;
pub mod key;
pub mod options;
pub mod template;

pub use authority::{
    DEFAULT_CA_COMMON_NAME, DEFAULT_CLIENT_COMMON_NAME, DEFAULT_SERVER_COMMON_NAME, Signer, new_ca,
    new_client_from_ca, new_server_from_ca,
};
pub use builder::{GeneratedCert, issue};
pub use files::{PemPaths, read_from_dir, write_to_dir};
pub use key::{KeyAlgorithm, KeyMaterial};
pub use options::{
    CertOption, IssuanceState, apply_all, is_ca, is_client, is_server, is_valid_for,
    with_common_name, with_dns_names, with_ip_addresses, with_key, with_new_ecdsa_key,
    with_new_rsa_key, with_parent,
};
pub use template::{CertificateTemplate, DEFAULT_VALIDITY_YEARS, generate_serial_number};
