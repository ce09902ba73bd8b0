//! TLS trust configuration: identity, CA pools, protocol policy and peer
//! verification, assembled from ordered [`TrustOption`]s.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::ServerCertVerifier;
use rustls::crypto::aws_lc_rs::{self, cipher_suite, kx_group};
use rustls::crypto::{CryptoProvider, SupportedKxGroup};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::server::danger::ClientCertVerifier;
use rustls::{
    ClientConfig, RootCertStore, ServerConfig, SupportedCipherSuite, SupportedProtocolVersion,
};
use tracing::debug;

use super::pem::{parse_certs, parse_private_key, read_file};
use super::policy::VerificationPolicy;
use super::verifier::{PolicyClientVerifier, PolicyServerVerifier};
use crate::{Error, Result};

static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13];

// ─────────────────────────────────────────────────────────────────────────────
// Protocol policy vocabulary
// ─────────────────────────────────────────────────────────────────────────────

/// Lowest protocol version a config accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolVersion {
    /// TLS 1.2 and 1.3.
    Tls12,
    /// TLS 1.3 only.
    Tls13,
}

/// TLS 1.2 cipher suites that may be put in a preference list.
///
/// TLS 1.3 suites are always enabled and are not configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherSuite {
    /// `TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256`
    EcdheEcdsaAes128GcmSha256,
    /// `TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384`
    EcdheEcdsaAes256GcmSha384,
    /// `TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256`
    EcdheEcdsaChacha20Poly1305,
    /// `TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256`
    EcdheRsaAes128GcmSha256,
    /// `TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384`
    EcdheRsaAes256GcmSha384,
    /// `TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256`
    EcdheRsaChacha20Poly1305,
}

impl CipherSuite {
    fn supported(self) -> SupportedCipherSuite {
        match self {
            Self::EcdheEcdsaAes128GcmSha256 => cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            Self::EcdheEcdsaAes256GcmSha384 => cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
            Self::EcdheEcdsaChacha20Poly1305 => {
                cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256
            }
            Self::EcdheRsaAes128GcmSha256 => cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            Self::EcdheRsaAes256GcmSha384 => cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            Self::EcdheRsaChacha20Poly1305 => {
                cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256
            }
        }
    }
}

/// Key-exchange groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    /// Curve25519.
    X25519,
    /// NIST P-256.
    P256,
    /// NIST P-384.
    P384,
    /// Not offered by the TLS provider; skipped when converting.
    P521,
}

impl Curve {
    fn supported(self) -> Option<&'static dyn SupportedKxGroup> {
        match self {
            Self::X25519 => Some(kx_group::X25519),
            Self::P256 => Some(kx_group::SECP256R1),
            Self::P384 => Some(kx_group::SECP384R1),
            Self::P521 => None,
        }
    }
}

/// Server policy for client certificates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClientAuthMode {
    /// Do not ask for a client certificate.
    #[default]
    NoClientCert,
    /// Ask; verify if one is presented.
    VerifyIfGiven,
    /// Ask and require a verified certificate.
    RequireAndVerify,
}

/// Fixed TLS 1.2 suite preference of the default server config.
pub const DEFAULT_SERVER_CIPHER_SUITES: [CipherSuite; 5] = [
    CipherSuite::EcdheEcdsaAes128GcmSha256,
    CipherSuite::EcdheEcdsaAes256GcmSha384,
    CipherSuite::EcdheEcdsaChacha20Poly1305,
    CipherSuite::EcdheRsaAes256GcmSha384,
    CipherSuite::EcdheRsaAes128GcmSha256,
];

/// Curve preference of the default server config.
pub const DEFAULT_SERVER_CURVES: [Curve; 3] = [Curve::P521, Curve::P384, Curve::P256];

// ─────────────────────────────────────────────────────────────────────────────
// TrustConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Local certificate chain and its private key.
pub struct Identity {
    /// Leaf first.
    pub chain: Vec<CertificateDer<'static>>,
    /// Private key of the leaf.
    pub key: PrivateKeyDer<'static>,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// A built, read-only trust configuration.
pub struct TrustConfig {
    identity: Option<Identity>,
    client_ca_pool: RootCertStore,
    root_ca_pool: RootCertStore,
    min_version: ProtocolVersion,
    cipher_suites: Vec<CipherSuite>,
    curves: Vec<Curve>,
    prefer_server_cipher_suites: bool,
    client_auth: ClientAuthMode,
    skip_builtin_verification: bool,
    verification: Option<VerificationPolicy>,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            identity: None,
            client_ca_pool: RootCertStore::empty(),
            root_ca_pool: RootCertStore::empty(),
            min_version: ProtocolVersion::Tls12,
            cipher_suites: Vec::new(),
            curves: Vec::new(),
            prefer_server_cipher_suites: false,
            client_auth: ClientAuthMode::NoClientCert,
            skip_builtin_verification: false,
            verification: None,
        }
    }
}

impl fmt::Debug for TrustConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustConfig")
            .field("identity", &self.identity)
            .field("client_ca_pool", &self.client_ca_pool.len())
            .field("root_ca_pool", &self.root_ca_pool.len())
            .field("min_version", &self.min_version)
            .field("cipher_suites", &self.cipher_suites)
            .field("curves", &self.curves)
            .field("prefer_server_cipher_suites", &self.prefer_server_cipher_suites)
            .field("client_auth", &self.client_auth)
            .field("skip_builtin_verification", &self.skip_builtin_verification)
            .field("verification", &self.verification)
            .finish()
    }
}

impl TrustConfig {
    /// Local identity, if one was configured.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Number of anchors used to verify client certificates.
    pub fn client_ca_count(&self) -> usize {
        self.client_ca_pool.len()
    }

    /// Number of anchors used to verify server certificates.
    pub fn root_ca_count(&self) -> usize {
        self.root_ca_pool.len()
    }

    /// Minimum protocol version.
    pub fn min_version(&self) -> ProtocolVersion {
        self.min_version
    }

    /// TLS 1.2 suite preference; empty means the provider default.
    pub fn cipher_suites(&self) -> &[CipherSuite] {
        &self.cipher_suites
    }

    /// Curve preference; empty means the provider default.
    pub fn curves(&self) -> &[Curve] {
        &self.curves
    }

    /// Whether the server's suite order wins over the client's.
    pub fn prefer_server_cipher_suites(&self) -> bool {
        self.prefer_server_cipher_suites
    }

    /// Client-certificate policy.
    pub fn client_auth(&self) -> ClientAuthMode {
        self.client_auth
    }

    /// Whether built-in chain and name verification is bypassed.
    pub fn skips_builtin_verification(&self) -> bool {
        self.skip_builtin_verification
    }

    /// Installed verification policy.
    pub fn verification(&self) -> Option<&VerificationPolicy> {
        self.verification.as_ref()
    }

    fn validate(&self) -> Result<()> {
        if self.client_auth == ClientAuthMode::RequireAndVerify && self.client_ca_pool.is_empty() {
            return Err(Error::Config(
                "mutual authentication requires a non-empty client CA pool".into(),
            ));
        }
        Ok(())
    }

    fn crypto_provider(&self) -> Result<Arc<CryptoProvider>> {
        let base = aws_lc_rs::default_provider();

        let mut suites: Vec<SupportedCipherSuite> = base
            .cipher_suites
            .iter()
            .copied()
            .filter(|s| matches!(s, SupportedCipherSuite::Tls13(_)))
            .collect();
        if self.cipher_suites.is_empty() {
            suites.extend(
                base.cipher_suites
                    .iter()
                    .copied()
                    .filter(|s| matches!(s, SupportedCipherSuite::Tls12(_))),
            );
        } else {
            suites.extend(self.cipher_suites.iter().map(|s| s.supported()));
        }

        let kx_groups = if self.curves.is_empty() {
            base.kx_groups.clone()
        } else {
            let groups: Vec<&'static dyn SupportedKxGroup> = self
                .curves
                .iter()
                .filter_map(|c| {
                    let group = c.supported();
                    if group.is_none() {
                        debug!(curve = ?c, "Curve not offered by TLS provider; skipping");
                    }
                    group
                })
                .collect();
            if groups.is_empty() {
                return Err(Error::Config(format!(
                    "none of the requested curves are supported: {:?}",
                    self.curves
                )));
            }
            groups
        };

        Ok(Arc::new(CryptoProvider {
            cipher_suites: suites,
            kx_groups,
            ..base
        }))
    }

    fn protocol_versions(&self) -> &'static [&'static SupportedProtocolVersion] {
        match self.min_version {
            ProtocolVersion::Tls12 => rustls::ALL_VERSIONS,
            ProtocolVersion::Tls13 => TLS13_ONLY,
        }
    }

    /// Convert to a rustls server configuration.
    ///
    /// # Errors
    ///
    /// Fails without an identity, when the identity's certificate and key do
    /// not match, or when the client verifier cannot be built.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>> {
        let identity = self
            .identity
            .as_ref()
            .ok_or_else(|| Error::Config("server trust config has no identity".into()))?;
        let provider = self.crypto_provider()?;

        let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(self.protocol_versions())?;

        let builder = match self.client_verifier(&provider)? {
            Some(verifier) => builder.with_client_cert_verifier(verifier),
            None => builder.with_no_client_auth(),
        };
        let mut cfg = builder
            .with_single_cert(identity.chain.clone(), identity.key.clone_key())
            .map_err(|e| Error::Config(format!("TLS config error (cert/key mismatch?): {e}")))?;
        cfg.ignore_client_order = self.prefer_server_cipher_suites;

        debug!(
            client_auth = ?self.client_auth,
            policy = self.verification.as_ref().map_or("none", VerificationPolicy::name),
            min_version = ?self.min_version,
            "Server TLS config built"
        );
        Ok(Arc::new(cfg))
    }

    fn client_verifier(
        &self,
        provider: &Arc<CryptoProvider>,
    ) -> Result<Option<Arc<dyn ClientCertVerifier>>> {
        if self.client_auth == ClientAuthMode::NoClientCert {
            if self.verification.is_some() {
                debug!("Verification policy ignored: server does not request client certificates");
            }
            return Ok(None);
        }
        let mandatory = self.client_auth == ClientAuthMode::RequireAndVerify;

        let builtin: Option<Arc<dyn ClientCertVerifier>> =
            if self.skip_builtin_verification || self.client_ca_pool.is_empty() {
                None
            } else {
                let builder = WebPkiClientVerifier::builder_with_provider(
                    Arc::new(self.client_ca_pool.clone()),
                    Arc::clone(provider),
                );
                let builder = if mandatory {
                    builder
                } else {
                    builder.allow_unauthenticated()
                };
                Some(
                    builder
                        .build()
                        .map_err(|e| Error::Config(format!("Failed to build client verifier: {e}")))?,
                )
            };

        match (&self.verification, builtin) {
            (None, Some(builtin)) => Ok(Some(builtin)),
            (None, None) if !self.skip_builtin_verification => Err(Error::Config(
                "client certificate verification requires a client CA pool".into(),
            )),
            (policy, builtin) => Ok(Some(Arc::new(PolicyClientVerifier::new(
                builtin,
                policy.clone().unwrap_or(VerificationPolicy::InsecureAcceptAny),
                mandatory,
                provider.signature_verification_algorithms,
            )))),
        }
    }

    /// Convert to a rustls client configuration.
    ///
    /// # Errors
    ///
    /// Fails when built-in verification is active without root CAs, or when
    /// the identity's certificate and key do not match.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>> {
        let provider = self.crypto_provider()?;

        let builtin: Option<Arc<dyn ServerCertVerifier>> = if self.skip_builtin_verification {
            None
        } else {
            let verifier: Arc<dyn ServerCertVerifier> = WebPkiServerVerifier::builder_with_provider(
                Arc::new(self.root_ca_pool.clone()),
                Arc::clone(&provider),
            )
            .build()
            .map_err(|e| Error::Config(format!("Failed to build server verifier: {e}")))?;
            Some(verifier)
        };

        let verifier: Arc<dyn ServerCertVerifier> = match (&self.verification, builtin) {
            (None, Some(builtin)) => builtin,
            (policy, builtin) => Arc::new(PolicyServerVerifier::new(
                builtin,
                policy.clone().unwrap_or(VerificationPolicy::InsecureAcceptAny),
                provider.signature_verification_algorithms,
            )),
        };

        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(self.protocol_versions())?
            .dangerous()
            .with_custom_certificate_verifier(verifier);

        let cfg = match &self.identity {
            Some(identity) => builder
                .with_client_auth_cert(identity.chain.clone(), identity.key.clone_key())
                .map_err(|e| Error::Config(format!("TLS config error (cert/key mismatch?): {e}")))?,
            None => builder.with_no_client_auth(),
        };

        debug!(
            skip_builtin = self.skip_builtin_verification,
            policy = self.verification.as_ref().map_or("none", VerificationPolicy::name),
            "Client TLS config built"
        );
        Ok(Arc::new(cfg))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// One step of trust configuration.
#[derive(Debug)]
pub enum TrustOption {
    /// Local identity from PEM bytes. Replaces any earlier identity.
    IdentityPem {
        /// Certificate chain, leaf first.
        cert_pem: Vec<u8>,
        /// Private key of the leaf.
        key_pem: Vec<u8>,
    },
    /// Local identity from PEM files. Replaces any earlier identity.
    IdentityFiles {
        /// Certificate chain file.
        cert_file: PathBuf,
        /// Private key file.
        key_file: PathBuf,
    },
    /// Append a PEM bundle to the client-CA pool.
    ClientCaPem(Vec<u8>),
    /// Append a PEM file to the client-CA pool.
    ClientCaFile(PathBuf),
    /// Append a PEM bundle to the root-CA pool.
    RootCaPem(Vec<u8>),
    /// Append a PEM file to the root-CA pool.
    RootCaFile(PathBuf),
    /// Lowest accepted protocol version.
    MinVersion(ProtocolVersion),
    /// TLS 1.2 suite preference, most preferred first.
    CipherSuites(Vec<CipherSuite>),
    /// Curve preference, most preferred first.
    Curves(Vec<Curve>),
    /// Let the server's suite order win.
    PreferServerCipherSuites,
    /// Require and verify a client certificate.
    MutualAuthentication,
    /// Verify a client certificate only when one is presented.
    VerifyClientCertIfGiven,
    /// Bypass built-in chain and name verification.
    SkipBuiltinVerification,
    /// Install a peer-verification policy.
    Verification(VerificationPolicy),
}

impl TrustOption {
    /// Apply this option to `cfg`.
    pub fn apply(self, mut cfg: TrustConfig) -> Result<TrustConfig> {
        match self {
            Self::IdentityPem { cert_pem, key_pem } => {
                cfg.identity = Some(identity_from_pem(&cert_pem, &key_pem)?);
            }
            Self::IdentityFiles { cert_file, key_file } => {
                let cert_pem = read_file(&cert_file)?;
                let key_pem = read_file(&key_file)?;
                cfg.identity = Some(identity_from_pem(&cert_pem, &key_pem)?);
            }
            Self::ClientCaPem(pem) => append_pool(&mut cfg.client_ca_pool, "client CA", &pem)?,
            Self::ClientCaFile(path) => {
                append_pool(&mut cfg.client_ca_pool, "client CA", &read_file(&path)?)?;
            }
            Self::RootCaPem(pem) => append_pool(&mut cfg.root_ca_pool, "root CA", &pem)?,
            Self::RootCaFile(path) => {
                append_pool(&mut cfg.root_ca_pool, "root CA", &read_file(&path)?)?;
            }
            Self::MinVersion(v) => cfg.min_version = v,
            Self::CipherSuites(suites) => cfg.cipher_suites = suites,
            Self::Curves(curves) => cfg.curves = curves,
            Self::PreferServerCipherSuites => cfg.prefer_server_cipher_suites = true,
            Self::MutualAuthentication => cfg.client_auth = ClientAuthMode::RequireAndVerify,
            Self::VerifyClientCertIfGiven => cfg.client_auth = ClientAuthMode::VerifyIfGiven,
            Self::SkipBuiltinVerification => cfg.skip_builtin_verification = true,
            Self::Verification(VerificationPolicy::DefaultChainVerify) => {
                cfg.verification = None;
                cfg.skip_builtin_verification = false;
            }
            Self::Verification(policy) => cfg.verification = Some(policy),
        }
        Ok(cfg)
    }
}

fn identity_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Identity> {
    let chain = parse_certs(cert_pem)?;
    if chain.is_empty() {
        return Err(Error::Config("identity PEM holds no certificates".into()));
    }
    let key = parse_private_key(key_pem)?;
    Ok(Identity { chain, key })
}

fn append_pool(pool: &mut RootCertStore, name: &'static str, pem: &[u8]) -> Result<()> {
    let certs = parse_certs(pem).map_err(|e| Error::CertPoolAppend {
        pool: name,
        reason: e.to_string(),
    })?;
    let found = certs.len();
    let (added, ignored) = pool.add_parsable_certificates(certs);
    if added == 0 {
        let reason = if found == 0 {
            "no certificates found in PEM".to_string()
        } else {
            format!("{ignored} certificate(s) could not be used as trust anchors")
        };
        return Err(Error::CertPoolAppend { pool: name, reason });
    }
    debug!(pool = name, added, ignored, "Appended certificates to pool");
    Ok(())
}

/// Build a [`TrustConfig`] from `options`, applied in order.
///
/// # Errors
///
/// Fails on the first failing option, or when mutual authentication is
/// required with an empty client-CA pool.
pub fn build(options: impl IntoIterator<Item = TrustOption>) -> Result<TrustConfig> {
    let cfg = options
        .into_iter()
        .try_fold(TrustConfig::default(), |cfg, opt| opt.apply(cfg))?;
    cfg.validate()?;
    Ok(cfg)
}

// ─────────────────────────────────────────────────────────────────────────────
// Presets
// ─────────────────────────────────────────────────────────────────────────────

fn path(p: impl AsRef<Path>) -> PathBuf {
    p.as_ref().to_path_buf()
}

/// Server trust: verify clients against `ca_file`, present `cert_file` /
/// `key_file`, require mutual authentication, TLS 1.2 floor, server suite
/// preference.
pub fn build_default_server_trust_config(
    ca_file: impl AsRef<Path>,
    cert_file: impl AsRef<Path>,
    key_file: impl AsRef<Path>,
) -> Result<TrustConfig> {
    build([
        TrustOption::ClientCaFile(path(ca_file)),
        TrustOption::IdentityFiles {
            cert_file: path(cert_file),
            key_file: path(key_file),
        },
        TrustOption::MutualAuthentication,
        TrustOption::MinVersion(ProtocolVersion::Tls12),
        TrustOption::PreferServerCipherSuites,
        TrustOption::Curves(DEFAULT_SERVER_CURVES.to_vec()),
        TrustOption::CipherSuites(DEFAULT_SERVER_CIPHER_SUITES.to_vec()),
    ])
}

/// Client trust with built-in chain and server-name verification against
/// `ca_file`.
pub fn build_default_client_trust_config(
    ca_file: impl AsRef<Path>,
    cert_file: impl AsRef<Path>,
    key_file: impl AsRef<Path>,
) -> Result<TrustConfig> {
    build([
        TrustOption::RootCaFile(path(ca_file)),
        TrustOption::IdentityFiles {
            cert_file: path(cert_file),
            key_file: path(key_file),
        },
    ])
}

/// Client trust where `policy` is the sole trust decision.
pub fn build_client_trust_config_with_custom_verification(
    ca_file: impl AsRef<Path>,
    cert_file: impl AsRef<Path>,
    key_file: impl AsRef<Path>,
    policy: VerificationPolicy,
) -> Result<TrustConfig> {
    build([
        TrustOption::RootCaFile(path(ca_file)),
        TrustOption::IdentityFiles {
            cert_file: path(cert_file),
            key_file: path(key_file),
        },
        TrustOption::SkipBuiltinVerification,
        TrustOption::Verification(policy),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::{
        GeneratedCert, new_ca, new_client_from_ca, new_server_from_ca, with_common_name,
        with_dns_names, write_to_dir,
    };

    struct Material {
        ca: GeneratedCert,
        server: GeneratedCert,
        client: GeneratedCert,
    }

    fn material() -> Material {
        let ca = new_ca([with_common_name("ca")]).unwrap();
        let server = new_server_from_ca(
            ca.key_pem.as_bytes(),
            ca.cert_pem.as_bytes(),
            [with_common_name("server.name"), with_dns_names(["server.name"])],
        )
        .unwrap();
        let client = new_client_from_ca(
            ca.key_pem.as_bytes(),
            ca.cert_pem.as_bytes(),
            [with_common_name("client.name")],
        )
        .unwrap();
        Material { ca, server, client }
    }

    #[test]
    fn empty_build_has_safe_defaults() {
        let cfg = build([]).unwrap();
        assert!(cfg.identity().is_none());
        assert_eq!(cfg.client_auth(), ClientAuthMode::NoClientCert);
        assert_eq!(cfg.min_version(), ProtocolVersion::Tls12);
        assert!(!cfg.skips_builtin_verification());
        assert!(cfg.verification().is_none());
    }

    #[test]
    fn mutual_auth_without_client_ca_fails_closed() {
        let err = build([TrustOption::MutualAuthentication]).unwrap_err();
        assert!(err.to_string().contains("client CA pool"));
    }

    #[test]
    fn empty_pem_bundle_is_a_pool_append_error() {
        let err = build([TrustOption::ClientCaPem(Vec::new())]).unwrap_err();
        assert!(
            matches!(err, Error::CertPoolAppend { pool: "client CA", .. }),
            "got {err:?}"
        );
        let err = build([TrustOption::RootCaPem(b"garbage".to_vec())]).unwrap_err();
        assert!(matches!(err, Error::CertPoolAppend { pool: "root CA", .. }));
    }

    #[test]
    fn pools_accumulate() {
        let a = new_ca([]).unwrap();
        let b = new_ca([]).unwrap();
        let cfg = build([
            TrustOption::RootCaPem(a.cert_pem.into_bytes()),
            TrustOption::RootCaPem(b.cert_pem.into_bytes()),
        ])
        .unwrap();
        assert_eq!(cfg.root_ca_count(), 2);
    }

    #[test]
    fn default_chain_verify_clears_policy_and_skip() {
        // GIVEN: a config that skips built-in checks with a custom policy
        // WHEN: the default policy is installed afterwards
        let cfg = build([
            TrustOption::SkipBuiltinVerification,
            TrustOption::Verification(VerificationPolicy::ForceFail),
            TrustOption::Verification(VerificationPolicy::DefaultChainVerify),
        ])
        .unwrap();
        // THEN: built-in verification is back in charge
        assert!(cfg.verification().is_none());
        assert!(!cfg.skips_builtin_verification());
    }

    #[test]
    fn later_auth_mode_wins() {
        let m = material();
        let cfg = build([
            TrustOption::ClientCaPem(m.ca.cert_pem.into_bytes()),
            TrustOption::MutualAuthentication,
            TrustOption::VerifyClientCertIfGiven,
        ])
        .unwrap();
        assert_eq!(cfg.client_auth(), ClientAuthMode::VerifyIfGiven);
    }

    #[test]
    fn default_server_preset_reads_files_and_converts() {
        // GIVEN: material on disk
        let m = material();
        let tmp = tempfile::tempdir().unwrap();
        let ca = write_to_dir(&m.ca, tmp.path(), "ca").unwrap();
        let server = write_to_dir(&m.server, tmp.path(), "server").unwrap();

        // WHEN: building the default server config
        let cfg = build_default_server_trust_config(&ca.cert, &server.cert, &server.key).unwrap();

        // THEN: the preset policy is in place and rustls accepts it
        assert_eq!(cfg.client_auth(), ClientAuthMode::RequireAndVerify);
        assert_eq!(cfg.cipher_suites(), DEFAULT_SERVER_CIPHER_SUITES.as_slice());
        assert_eq!(cfg.curves(), DEFAULT_SERVER_CURVES.as_slice());
        assert!(cfg.prefer_server_cipher_suites());
        let rustls_cfg = cfg.server_config().unwrap();
        assert!(rustls_cfg.ignore_client_order);
    }

    #[test]
    fn unsupported_curve_is_skipped_but_not_alone() {
        let cfg = build([TrustOption::Curves(vec![Curve::P521, Curve::P256])]).unwrap();
        let provider = cfg.crypto_provider().unwrap();
        assert_eq!(provider.kx_groups.len(), 1);

        let only_p521 = build([TrustOption::Curves(vec![Curve::P521])]).unwrap();
        assert!(matches!(only_p521.crypto_provider(), Err(Error::Config(_))));
    }

    #[test]
    fn tls13_suites_survive_a_custom_tls12_list() {
        let cfg = build([TrustOption::CipherSuites(vec![
            CipherSuite::EcdheEcdsaAes128GcmSha256,
        ])])
        .unwrap();
        let provider = cfg.crypto_provider().unwrap();
        let tls12 = provider
            .cipher_suites
            .iter()
            .filter(|s| matches!(s, SupportedCipherSuite::Tls12(_)))
            .count();
        assert_eq!(tls12, 1);
        assert!(
            provider
                .cipher_suites
                .iter()
                .any(|s| matches!(s, SupportedCipherSuite::Tls13(_)))
        );
    }

    #[test]
    fn version_floor_selects_protocols() {
        let m = material();
        let identity = || TrustOption::IdentityPem {
            cert_pem: m.server.cert_pem.clone().into_bytes(),
            key_pem: m.server.key_pem.clone().into_bytes(),
        };

        let tls12 = build([identity()]).unwrap();
        assert_eq!(tls12.protocol_versions().len(), rustls::ALL_VERSIONS.len());

        let tls13 = build([
            identity(),
            TrustOption::RootCaPem(m.ca.cert_pem.clone().into_bytes()),
            TrustOption::MinVersion(ProtocolVersion::Tls13),
        ])
        .unwrap();
        assert_eq!(tls13.protocol_versions().len(), 1);
        assert_eq!(tls13.protocol_versions()[0].version, rustls::ProtocolVersion::TLSv1_3);
        assert!(tls13.server_config().is_ok());
        assert!(tls13.client_config().is_ok());
    }

    #[test]
    fn server_config_requires_identity() {
        let err = build([]).unwrap().server_config().unwrap_err();
        assert!(err.to_string().contains("no identity"));
    }

    #[test]
    fn mismatched_identity_is_rejected_at_conversion() {
        let m = material();
        let cfg = build([TrustOption::IdentityPem {
            cert_pem: m.server.cert_pem.into_bytes(),
            key_pem: m.client.key_pem.into_bytes(),
        }])
        .unwrap();
        assert!(cfg.server_config().is_err());
    }

    #[test]
    fn default_client_needs_roots_custom_client_does_not() {
        let m = material();
        let identity = || TrustOption::IdentityPem {
            cert_pem: m.client.cert_pem.clone().into_bytes(),
            key_pem: m.client.key_pem.clone().into_bytes(),
        };

        let no_roots = build([identity()]).unwrap();
        assert!(no_roots.client_config().is_err());

        let custom = build([
            identity(),
            TrustOption::SkipBuiltinVerification,
            TrustOption::Verification(VerificationPolicy::InsecureAcceptAny),
        ])
        .unwrap();
        assert!(custom.client_config().is_ok());
    }

    #[test]
    fn custom_verification_preset_skips_builtin() {
        let m = material();
        let tmp = tempfile::tempdir().unwrap();
        let ca = write_to_dir(&m.ca, tmp.path(), "ca").unwrap();
        let client = write_to_dir(&m.client, tmp.path(), "client").unwrap();

        let cfg = build_client_trust_config_with_custom_verification(
            &ca.cert,
            &client.cert,
            &client.key,
            VerificationPolicy::InsecureAcceptAny,
        )
        .unwrap();
        assert!(cfg.skips_builtin_verification());
        assert_eq!(cfg.root_ca_count(), 1);
        cfg.client_config().unwrap();

        let default = build_default_client_trust_config(&ca.cert, &client.cert, &client.key).unwrap();
        assert!(!default.skips_builtin_verification());
        default.client_config().unwrap();
    }

    #[test]
    fn missing_ca_file_is_reported() {
        let err = build_default_server_trust_config("/nonexistent/ca.pem", "/x", "/y").unwrap_err();
        assert!(err.to_string().contains("Cannot read"));
    }
}
