//! Adapters that run a [`VerificationPolicy`] inside the rustls handshake.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{WebPkiSupportedAlgorithms, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{CertificateError, DigitallySignedStruct, DistinguishedName, OtherError, SignatureScheme};
use tracing::{debug, warn};

use super::policy::VerificationPolicy;
use crate::Error;

fn policy_error(err: Error) -> rustls::Error {
    rustls::Error::InvalidCertificate(CertificateError::Other(OtherError(Arc::new(err))))
}

fn run_policy(
    policy: &VerificationPolicy,
    end_entity: &CertificateDer<'_>,
    intermediates: &[CertificateDer<'_>],
) -> Result<(), rustls::Error> {
    let mut chain = Vec::with_capacity(1 + intermediates.len());
    chain.push(end_entity.clone());
    chain.extend(intermediates.iter().cloned());

    policy.verify(&chain).map_err(|e| {
        warn!(policy = policy.name(), error = %e, "Peer rejected by verification policy");
        policy_error(e)
    })
}

/// Client-side verifier of server certificates.
///
/// Runs the built-in verifier first when present, then the policy.
#[derive(Debug)]
pub struct PolicyServerVerifier {
    builtin: Option<Arc<dyn ServerCertVerifier>>,
    policy: VerificationPolicy,
    algorithms: WebPkiSupportedAlgorithms,
}

impl PolicyServerVerifier {
    /// Verifier with an optional built-in stage and a policy stage.
    pub fn new(
        builtin: Option<Arc<dyn ServerCertVerifier>>,
        policy: VerificationPolicy,
        algorithms: WebPkiSupportedAlgorithms,
    ) -> Self {
        Self {
            builtin,
            policy,
            algorithms,
        }
    }
}

impl ServerCertVerifier for PolicyServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if let Some(builtin) = &self.builtin {
            builtin.verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)?;
        }
        run_policy(&self.policy, end_entity, intermediates)?;
        debug!(policy = self.policy.name(), "Server certificate accepted");
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Server-side verifier of client certificates.
///
/// With a built-in stage, client-auth offering and root hints follow it;
/// without one they follow the configured mode.
#[derive(Debug)]
pub struct PolicyClientVerifier {
    builtin: Option<Arc<dyn ClientCertVerifier>>,
    policy: VerificationPolicy,
    mandatory: bool,
    algorithms: WebPkiSupportedAlgorithms,
    no_hints: Vec<DistinguishedName>,
}

impl PolicyClientVerifier {
    /// Verifier with an optional built-in stage and a policy stage.
    pub fn new(
        builtin: Option<Arc<dyn ClientCertVerifier>>,
        policy: VerificationPolicy,
        mandatory: bool,
        algorithms: WebPkiSupportedAlgorithms,
    ) -> Self {
        Self {
            builtin,
            policy,
            mandatory,
            algorithms,
            no_hints: Vec::new(),
        }
    }
}

impl ClientCertVerifier for PolicyClientVerifier {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        self.builtin
            .as_ref()
            .map_or(self.mandatory, |b| b.client_auth_mandatory())
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        self.builtin
            .as_ref()
            .map_or(self.no_hints.as_slice(), |b| b.root_hint_subjects())
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        if let Some(builtin) = &self.builtin {
            builtin.verify_client_cert(end_entity, intermediates, now)?;
        }
        run_policy(&self.policy, end_entity, intermediates)?;
        debug!(policy = self.policy.name(), "Client certificate accepted");
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
