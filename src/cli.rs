//! Command-line interface

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Private mutual-TLS trust domain: certificates, server, client and proxy
#[derive(Parser, Debug)]
#[command(name = "mtlssh")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "MTLSSH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MTLSSH_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "MTLSSH_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// TLS material flags shared by the endpoint subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct MaterialArgs {
    /// CA bundle (PEM)
    #[arg(long)]
    pub ca: Option<PathBuf>,

    /// Certificate (PEM)
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// Private key (PEM)
    #[arg(long)]
    pub key: Option<PathBuf>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve mTLS and echo every session back to its client
    Server {
        /// Listen address
        #[arg(long)]
        addr: Option<String>,

        /// TLS material overrides
        #[command(flatten)]
        material: MaterialArgs,
    },

    /// Dial a server and bridge the session to stdin/stdout
    Client {
        /// Server address
        #[arg(long)]
        addr: Option<String>,

        /// TLS server name (defaults to the host of --addr)
        #[arg(long)]
        server_name: Option<String>,

        /// Accept any server certificate
        #[arg(long)]
        insecure: bool,

        /// TLS material overrides
        #[command(flatten)]
        material: MaterialArgs,
    },

    /// Certificate issuance commands
    #[command(subcommand)]
    Cert(CertCommand),

    /// Terminate mTLS and forward each session to a plain TCP upstream
    Proxy {
        /// mTLS listen address
        #[arg(long)]
        listen: Option<String>,

        /// Upstream address
        #[arg(long)]
        upstream: Option<String>,

        /// TLS material overrides
        #[command(flatten)]
        material: MaterialArgs,
    },
}

/// Flags shared by every issuance subcommand
#[derive(Args, Debug, Clone)]
pub struct IssueArgs {
    /// Subject common name (defaults to ssh.<role>.name)
    #[arg(long)]
    pub cn: Option<String>,

    /// DNS Subject Alternative Name (repeatable)
    #[arg(long = "dns")]
    pub dns_names: Vec<String>,

    /// IP Subject Alternative Name (repeatable)
    #[arg(long = "ip")]
    pub ip_addresses: Vec<IpAddr>,

    /// Validity in days (defaults to ten years)
    #[arg(long)]
    pub valid_days: Option<u64>,

    /// Generate an RSA key instead of ECDSA P-256
    #[arg(long)]
    pub rsa: bool,

    /// Output directory
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// File name prefix (`<prefix>.cert.pem`, `<prefix>.priv.key.pem`)
    #[arg(long)]
    pub prefix: Option<String>,
}

/// Issuer material for leaf subcommands
#[derive(Args, Debug, Clone)]
pub struct IssuerArgs {
    /// Issuer certificate (PEM)
    #[arg(long, default_value = "ca.cert.pem")]
    pub ca_cert: PathBuf,

    /// Issuer private key (PEM)
    #[arg(long, default_value = "ca.priv.key.pem")]
    pub ca_key: PathBuf,
}

/// Certificate subcommands
#[derive(Subcommand, Debug)]
pub enum CertCommand {
    /// Issue a self-signed certificate authority
    Ca {
        /// Issuance flags
        #[command(flatten)]
        issue: IssueArgs,
    },

    /// Issue a server certificate signed by a CA
    Server {
        /// Issuance flags
        #[command(flatten)]
        issue: IssueArgs,

        /// Issuer certificate and key
        #[command(flatten)]
        issuer: IssuerArgs,
    },

    /// Issue a client certificate signed by a CA
    Client {
        /// Issuance flags
        #[command(flatten)]
        issue: IssueArgs,

        /// Issuer certificate and key
        #[command(flatten)]
        issuer: IssuerArgs,
    },
}
