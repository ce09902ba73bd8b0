//! Configuration management

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::endpoint::DEFAULT_ADDR;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Client configuration
    pub client: ClientConfig,
    /// Proxy configuration
    pub proxy: ProxyConfig,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub addr: String,
    /// CA bundle used to verify client certificates
    pub ca_file: PathBuf,
    /// Server certificate
    pub cert_file: PathBuf,
    /// Server private key
    pub key_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            ca_file: PathBuf::from("ca.cert.pem"),
            cert_file: PathBuf::from("server.cert.pem"),
            key_file: PathBuf::from("server.priv.key.pem"),
        }
    }
}

/// How the client decides to trust the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMode {
    /// Chain and server-name verification against `ca_file`
    #[default]
    Default,
    /// Accept any server certificate (bootstrap and testing only)
    Insecure,
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address to dial
    pub addr: String,
    /// TLS server name override; defaults to the host of `addr`
    pub server_name: Option<String>,
    /// CA bundle used to verify the server certificate
    pub ca_file: PathBuf,
    /// Client certificate
    pub cert_file: PathBuf,
    /// Client private key
    pub key_file: PathBuf,
    /// Server verification mode
    pub verification: VerificationMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            server_name: None,
            ca_file: PathBuf::from("ca.cert.pem"),
            cert_file: PathBuf::from("client.cert.pem"),
            key_file: PathBuf::from("client.priv.key.pem"),
            verification: VerificationMode::Default,
        }
    }
}

/// Proxy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// mTLS listen address
    pub listen_addr: String,
    /// Plain TCP upstream each session is forwarded to
    pub upstream_addr: String,
    /// CA bundle used to verify client certificates
    pub ca_file: PathBuf,
    /// Proxy certificate
    pub cert_file: PathBuf,
    /// Proxy private key
    pub key_file: PathBuf,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_ADDR.to_string(),
            upstream_addr: "127.0.0.1:22".to_string(),
            ca_file: PathBuf::from("ca.cert.pem"),
            cert_file: PathBuf::from("server.cert.pem"),
            key_file: PathBuf::from("server.priv.key.pem"),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (MTLSSH_ prefix)
        figment = figment.merge(Env::prefixed("MTLSSH_").split("__"));

        figment.extract().map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_point_at_local_material() {
        let config = Config::default();
        assert_eq!(config.server.addr, "127.0.0.1:2222");
        assert_eq!(config.client.addr, config.server.addr);
        assert_eq!(config.server.key_file, PathBuf::from("server.priv.key.pem"));
        assert_eq!(config.client.verification, VerificationMode::Default);
        assert!(config.client.server_name.is_none());
    }

    #[test]
    fn missing_named_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/mtlssh.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn yaml_overrides_defaults_per_field() {
        // GIVEN: a file that only touches a few fields
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mtlssh.yaml");
        std::fs::write(
            &path,
            "server:\n  addr: 0.0.0.0:9000\nclient:\n  server_name: server.name\n  verification: insecure\n",
        )
        .unwrap();

        // WHEN: loading
        let config = Config::load(Some(&path)).unwrap();

        // THEN: named fields change, the rest keep their defaults
        assert_eq!(config.server.addr, "0.0.0.0:9000");
        assert_eq!(config.server.ca_file, PathBuf::from("ca.cert.pem"));
        assert_eq!(config.client.server_name.as_deref(), Some("server.name"));
        assert_eq!(config.client.verification, VerificationMode::Insecure);
        assert_eq!(config.proxy, ProxyConfig::default());
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "client:\n  verification: sometimes\n").unwrap();
        assert!(matches!(Config::load(Some(&path)), Err(Error::Config(_))));
    }
}
