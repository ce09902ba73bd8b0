//! Peer-certificate verification policies.
//!
//! A [`VerificationPolicy`] is a pure decision over the raw chain the peer
//! presented, `[end_entity, intermediates...]`. It runs after the handshake
//! signatures have been checked and, unless built-in verification is skipped,
//! after the built-in chain verification.

use std::fmt;
use std::sync::Arc;

use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::ServerCertVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::RootCertStore;
use x509_parser::prelude::*;

use crate::{Error, Result};

/// Caller-supplied decision over the decoded first peer certificate.
pub type PeerPredicate = Arc<dyn Fn(&X509Certificate<'_>) -> Result<()> + Send + Sync>;

/// Chain-verification parameters for [`VerificationPolicy::FirstPeerCertAgainstOptions`].
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Trust anchors.
    pub roots: Arc<RootCertStore>,
    /// Extra intermediates, tried in addition to those the peer sent.
    pub intermediates: Vec<CertificateDer<'static>>,
    /// Name the end-entity certificate must be valid for.
    pub server_name: ServerName<'static>,
    /// Verification time; `None` means now.
    pub time: Option<UnixTime>,
}

impl VerifyOptions {
    /// Options checking against `roots` for `server_name`, at the current time.
    pub fn new(roots: RootCertStore, server_name: ServerName<'static>) -> Self {
        Self {
            roots: Arc::new(roots),
            intermediates: Vec::new(),
            server_name,
            time: None,
        }
    }

    /// Add intermediates to use while building the chain.
    #[must_use]
    pub fn with_intermediates(mut self, certs: impl IntoIterator<Item = CertificateDer<'static>>) -> Self {
        self.intermediates.extend(certs);
        self
    }

    /// Verify as of `time` instead of now.
    #[must_use]
    pub fn at_time(mut self, time: UnixTime) -> Self {
        self.time = Some(time);
        self
    }
}

/// Named peer-verification strategies.
#[derive(Clone)]
pub enum VerificationPolicy {
    /// Rely on built-in chain and name verification. As a callback, a no-op.
    DefaultChainVerify,
    /// Accept any peer chain. Handshake signatures are still checked.
    InsecureAcceptAny,
    /// Reject every peer.
    ForceFail,
    /// Verify the first certificate against explicit roots, name and time.
    ///
    /// The end-entity certificate must carry the server-auth extended usage.
    FirstPeerCertAgainstOptions(VerifyOptions),
    /// Decode the first certificate and let a predicate decide.
    FirstPeerCertCustomPredicate(PeerPredicate),
}

impl VerificationPolicy {
    /// Wrap a closure as [`VerificationPolicy::FirstPeerCertCustomPredicate`].
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&X509Certificate<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self::FirstPeerCertCustomPredicate(Arc::new(predicate))
    }

    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DefaultChainVerify => "default-chain-verify",
            Self::InsecureAcceptAny => "insecure-accept-any",
            Self::ForceFail => "force-fail",
            Self::FirstPeerCertAgainstOptions(_) => "first-peer-cert-against-options",
            Self::FirstPeerCertCustomPredicate(_) => "first-peer-cert-custom-predicate",
        }
    }

    /// Decide on `chain`.
    pub fn verify(&self, chain: &[CertificateDer<'_>]) -> Result<()> {
        match self {
            Self::DefaultChainVerify | Self::InsecureAcceptAny => Ok(()),
            Self::ForceFail => Err(Error::verification("rejected by force-fail policy")),
            Self::FirstPeerCertAgainstOptions(opts) => verify_against_options(chain, opts),
            Self::FirstPeerCertCustomPredicate(predicate) => {
                let first = chain
                    .first()
                    .filter(|c| !c.is_empty())
                    .ok_or(Error::NilFirstCertificate)?;
                let (_, cert) = X509Certificate::from_der(first)
                    .map_err(|e| Error::verification(format!("cannot decode peer certificate: {e}")))?;
                predicate(&cert)
            }
        }
    }
}

impl fmt::Debug for VerificationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstPeerCertAgainstOptions(opts) => f
                .debug_tuple("FirstPeerCertAgainstOptions")
                .field(opts)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

fn verify_against_options(chain: &[CertificateDer<'_>], opts: &VerifyOptions) -> Result<()> {
    let (end_entity, rest) = chain.split_first().ok_or(Error::NoPeerCertificate)?;

    let mut intermediates: Vec<CertificateDer<'_>> = rest.to_vec();
    intermediates.extend(opts.intermediates.iter().cloned());

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let verifier = WebPkiServerVerifier::builder_with_provider(Arc::clone(&opts.roots), provider)
        .build()
        .map_err(|e| Error::verification(format!("cannot build chain verifier: {e}")))?;

    let now = opts.time.unwrap_or_else(UnixTime::now);
    verifier
        .verify_server_cert(end_entity, &intermediates, &opts.server_name, &[], now)
        .map(|_| ())
        .map_err(|e| Error::verification(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::{
        new_ca, new_client_from_ca, new_server_from_ca, with_common_name, with_dns_names,
    };
    use crate::tlsconf::pem::parse_certs;

    fn der(pem: &str) -> CertificateDer<'static> {
        parse_certs(pem.as_bytes()).unwrap().remove(0)
    }

    fn roots_for(pem: &str) -> RootCertStore {
        let mut roots = RootCertStore::empty();
        roots.add_parsable_certificates(parse_certs(pem.as_bytes()).unwrap());
        roots
    }

    #[test]
    fn accept_any_and_default_are_no_ops() {
        assert!(VerificationPolicy::InsecureAcceptAny.verify(&[]).is_ok());
        assert!(VerificationPolicy::DefaultChainVerify.verify(&[]).is_ok());
    }

    #[test]
    fn force_fail_always_fails() {
        let ca = new_ca([]).unwrap();
        let err = VerificationPolicy::ForceFail
            .verify(&[der(&ca.cert_pem)])
            .unwrap_err();
        assert!(err.is_verification_failure());
    }

    #[test]
    fn against_options_requires_a_certificate() {
        let ca = new_ca([]).unwrap();
        let opts = VerifyOptions::new(
            roots_for(&ca.cert_pem),
            ServerName::try_from("server.name").unwrap(),
        );
        let err = VerificationPolicy::FirstPeerCertAgainstOptions(opts)
            .verify(&[])
            .unwrap_err();
        assert!(matches!(err, Error::NoPeerCertificate), "got {err:?}");
    }

    #[test]
    fn against_options_accepts_matching_server() {
        // GIVEN: a server cert with a DNS SAN under a known root
        let ca = new_ca([with_common_name("ca")]).unwrap();
        let server = new_server_from_ca(
            ca.key_pem.as_bytes(),
            ca.cert_pem.as_bytes(),
            [with_common_name("server.name"), with_dns_names(["server.name"])],
        )
        .unwrap();
        let opts = VerifyOptions::new(
            roots_for(&ca.cert_pem),
            ServerName::try_from("server.name").unwrap(),
        );

        // WHEN/THEN: verification succeeds
        VerificationPolicy::FirstPeerCertAgainstOptions(opts)
            .verify(&[der(&server.cert_pem)])
            .unwrap();
    }

    #[test]
    fn against_options_rejects_wrong_name() {
        let ca = new_ca([]).unwrap();
        let server = new_server_from_ca(
            ca.key_pem.as_bytes(),
            ca.cert_pem.as_bytes(),
            [with_dns_names(["server.name"])],
        )
        .unwrap();
        let opts = VerifyOptions::new(
            roots_for(&ca.cert_pem),
            ServerName::try_from("other.name").unwrap(),
        );
        let err = VerificationPolicy::FirstPeerCertAgainstOptions(opts)
            .verify(&[der(&server.cert_pem)])
            .unwrap_err();
        assert!(matches!(err, Error::Verification(_)), "got {err:?}");
    }

    #[test]
    fn against_options_rejects_foreign_root() {
        let ca = new_ca([]).unwrap();
        let other = new_ca([]).unwrap();
        let server = new_server_from_ca(
            ca.key_pem.as_bytes(),
            ca.cert_pem.as_bytes(),
            [with_dns_names(["server.name"])],
        )
        .unwrap();
        let opts = VerifyOptions::new(
            roots_for(&other.cert_pem),
            ServerName::try_from("server.name").unwrap(),
        );
        assert!(
            VerificationPolicy::FirstPeerCertAgainstOptions(opts)
                .verify(&[der(&server.cert_pem)])
                .is_err()
        );
    }

    #[test]
    fn against_options_honours_verification_time() {
        // GIVEN: a valid server cert checked far in the future
        let ca = new_ca([]).unwrap();
        let server = new_server_from_ca(
            ca.key_pem.as_bytes(),
            ca.cert_pem.as_bytes(),
            [with_dns_names(["server.name"])],
        )
        .unwrap();
        let year_2200 = UnixTime::since_unix_epoch(std::time::Duration::from_secs(7_258_118_400));
        let opts = VerifyOptions::new(
            roots_for(&ca.cert_pem),
            ServerName::try_from("server.name").unwrap(),
        )
        .at_time(year_2200);

        // THEN: the expired window is rejected
        assert!(
            VerificationPolicy::FirstPeerCertAgainstOptions(opts)
                .verify(&[der(&server.cert_pem)])
                .is_err()
        );
    }

    #[test]
    fn against_options_uses_extra_intermediates() {
        use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, Issuer, KeyPair};

        // GIVEN: root -> intermediate -> server, with only the root trusted
        let root = new_ca([with_common_name("root")]).unwrap();
        let root_issuer =
            Issuer::from_ca_cert_pem(&root.cert_pem, KeyPair::from_pem(&root.key_pem).unwrap())
                .unwrap();
        let mut params = CertificateParams::default();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, "intermediate");
        let intermediate_key = KeyPair::generate().unwrap();
        let intermediate = params.signed_by(&intermediate_key, &root_issuer).unwrap();

        let server = new_server_from_ca(
            intermediate_key.serialize_pem().as_bytes(),
            intermediate.pem().as_bytes(),
            [with_dns_names(["server.name"])],
        )
        .unwrap();
        let opts = VerifyOptions::new(
            roots_for(&root.cert_pem),
            ServerName::try_from("server.name").unwrap(),
        );

        // WHEN: the peer sends only its leaf
        let leaf_only = [der(&server.cert_pem)];

        // THEN: the chain builds only once the intermediate is supplied
        assert!(
            VerificationPolicy::FirstPeerCertAgainstOptions(opts.clone())
                .verify(&leaf_only)
                .is_err()
        );
        VerificationPolicy::FirstPeerCertAgainstOptions(
            opts.with_intermediates([intermediate.der().clone()]),
        )
        .verify(&leaf_only)
        .unwrap();
    }

    #[test]
    fn predicate_sees_decoded_common_name() {
        let ca = new_ca([]).unwrap();
        let client = new_client_from_ca(
            ca.key_pem.as_bytes(),
            ca.cert_pem.as_bytes(),
            [with_common_name("client.name")],
        )
        .unwrap();

        let policy = VerificationPolicy::custom(|cert| {
            let cn = cert
                .subject()
                .iter_common_name()
                .next()
                .and_then(|a| a.as_str().ok());
            if cn == Some("client.name") {
                Ok(())
            } else {
                Err(Error::verification("unexpected common name"))
            }
        });
        policy.verify(&[der(&client.cert_pem)]).unwrap();
        assert!(policy.verify(&[der(&ca.cert_pem)]).is_err());
    }

    #[test]
    fn predicate_rejects_missing_or_empty_first_certificate() {
        let policy = VerificationPolicy::custom(|_| Ok(()));
        assert!(matches!(policy.verify(&[]), Err(Error::NilFirstCertificate)));
        let empty = CertificateDer::from(Vec::new());
        assert!(matches!(policy.verify(&[empty]), Err(Error::NilFirstCertificate)));
    }

    #[test]
    fn debug_names_the_strategy() {
        let policy = VerificationPolicy::custom(|_| Ok(()));
        assert_eq!(format!("{policy:?}"), "first-peer-cert-custom-predicate");
    }
}
