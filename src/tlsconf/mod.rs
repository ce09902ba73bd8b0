//! TLS trust configuration and peer verification.
//!
//! # Architecture
//!
//! ```text
//! [TrustOption, ...] --fold--> TrustConfig --server_config()--> Arc<rustls::ServerConfig>
//!                                   │        --client_config()--> Arc<rustls::ClientConfig>
//!                                   │
//!                      VerificationPolicy (optional)
//!                                   │
//!                 PolicyServerVerifier / PolicyClientVerifier
//! ```
//!
//! # Modules
//!
//! - [`pem`]: PEM parsing for identities and CA bundles
//! - [`trust`]: `TrustConfig`, `TrustOption`, and the default presets
//! - [`policy`]: `VerificationPolicy` strategies
//! - [`verifier`]: rustls verifier adapters running a policy

pub mod pem;
pub mod policy;
pub mod trust;
pub mod verifier;

pub use policy::{PeerPredicate, VerificationPolicy, VerifyOptions};
pub use trust::{
    CipherSuite, ClientAuthMode, Curve, DEFAULT_SERVER_CIPHER_SUITES, DEFAULT_SERVER_CURVES,
    Identity, ProtocolVersion, TrustConfig, TrustOption, build,
    build_client_trust_config_with_custom_verification, build_default_client_trust_config,
    build_default_server_trust_config,
};
