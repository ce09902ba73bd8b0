//! mtlssh - private mutual-TLS trust domain
//!
//! Issues CA / server / client certificates and runs mTLS endpoints.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{error, info, warn};

use mtlssh::{
    cert::{self, CertOption, GeneratedCert},
    cli::{CertCommand, Cli, Command, IssueArgs, IssuerArgs, MaterialArgs},
    config::{Config, VerificationMode},
    endpoint::{Client, ClientOption, IncomingConnection, Server, ServerOption},
    proxy, setup_tracing,
    tlsconf::{self, VerificationPolicy},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Cert(cmd) => run_cert(cmd),
        command => match Config::load(cli.config.as_deref()) {
            Ok(config) => run_endpoint(command, config).await,
            Err(e) => Err(e).context("Failed to load configuration"),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_endpoint(command: Command, mut config: Config) -> anyhow::Result<()> {
    match command {
        Command::Server { addr, material } => {
            let s = &mut config.server;
            override_material(&material, &mut s.ca_file, &mut s.cert_file, &mut s.key_file);
            if let Some(addr) = addr {
                s.addr = addr;
            }
            run_server(&config).await
        }
        Command::Client {
            addr,
            server_name,
            insecure,
            material,
        } => {
            let c = &mut config.client;
            override_material(&material, &mut c.ca_file, &mut c.cert_file, &mut c.key_file);
            if let Some(addr) = addr {
                c.addr = addr;
            }
            if server_name.is_some() {
                c.server_name = server_name;
            }
            if insecure {
                c.verification = VerificationMode::Insecure;
            }
            run_client(&config).await
        }
        Command::Proxy {
            listen,
            upstream,
            material,
        } => {
            let p = &mut config.proxy;
            override_material(&material, &mut p.ca_file, &mut p.cert_file, &mut p.key_file);
            if let Some(listen) = listen {
                p.listen_addr = listen;
            }
            if let Some(upstream) = upstream {
                p.upstream_addr = upstream;
            }
            run_proxy(&config).await
        }
        Command::Cert(_) => bail!("certificate commands do not use endpoint configuration"),
    }
}

fn override_material(
    m: &MaterialArgs,
    ca: &mut std::path::PathBuf,
    cert: &mut std::path::PathBuf,
    key: &mut std::path::PathBuf,
) {
    if let Some(p) = &m.ca {
        ca.clone_from(p);
    }
    if let Some(p) = &m.cert {
        cert.clone_from(p);
    }
    if let Some(p) = &m.key {
        key.clone_from(p);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Endpoints
// ─────────────────────────────────────────────────────────────────────────────

async fn run_server(config: &Config) -> anyhow::Result<()> {
    let s = &config.server;
    let trust = tlsconf::build_default_server_trust_config(&s.ca_file, &s.cert_file, &s.key_file)
        .context("Failed to build server trust configuration")?;

    let mut server = Server::new([
        ServerOption::Addr(s.addr.clone()),
        ServerOption::Trust(trust),
        ServerOption::handler(echo),
    ])?;
    let addr = server.start().await?;
    info!(version = env!("CARGO_PKG_VERSION"), addr = %addr, "mtlssh server running");

    shutdown_signal().await;
    server.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Handshake, log the client, echo bytes until EOF.
async fn echo(conn: IncomingConnection) {
    let peer = conn.peer_addr();
    let session = match conn.handshake().await {
        Ok(s) => s,
        Err(e) => {
            warn!(peer = %peer, error = %e, "Handshake failed");
            return;
        }
    };
    match session.peer_identity() {
        Ok(id) => info!(
            peer = %peer,
            cn = id.common_name.as_deref().unwrap_or("<none>"),
            issuer = id.issuer_common_name.as_deref().unwrap_or("<none>"),
            serial = %id.serial_hex,
            "Client authenticated"
        ),
        Err(e) => warn!(peer = %peer, error = %e, "Client identity unavailable"),
    }

    let (mut rd, mut wr) = tokio::io::split(session);
    match tokio::io::copy(&mut rd, &mut wr).await {
        Ok(n) => info!(peer = %peer, bytes = n, "Session closed"),
        Err(e) => warn!(peer = %peer, error = %e, "Session ended with error"),
    }
}

async fn run_client(config: &Config) -> anyhow::Result<()> {
    let c = &config.client;
    let trust = match c.verification {
        VerificationMode::Default => {
            tlsconf::build_default_client_trust_config(&c.ca_file, &c.cert_file, &c.key_file)
        }
        VerificationMode::Insecure => {
            warn!("Server certificate verification disabled");
            tlsconf::build_client_trust_config_with_custom_verification(
                &c.ca_file,
                &c.cert_file,
                &c.key_file,
                VerificationPolicy::InsecureAcceptAny,
            )
        }
    }
    .context("Failed to build client trust configuration")?;

    let mut options = vec![ClientOption::Addr(c.addr.clone()), ClientOption::Trust(trust)];
    if let Some(name) = &c.server_name {
        options.push(ClientOption::ServerName(name.clone()));
    }
    let client = Client::new(options)?;

    let session = client
        .dial()
        .await
        .with_context(|| format!("Failed to dial {}", c.addr))?
        .handshake()
        .await?;
    match session.peer_identity() {
        Ok(id) => info!(
            server = %id,
            issuer = id.issuer_common_name.as_deref().unwrap_or("<none>"),
            version = ?session.protocol_version(),
            cipher_suite = ?session.cipher_suite().map(|s| s.suite()),
            "Connected"
        ),
        Err(e) => warn!(error = %e, "Server identity unavailable"),
    }

    let (mut rd, mut wr) = tokio::io::split(session);
    let upload = async {
        let mut stdin = tokio::io::stdin();
        let mut buf = vec![0u8; 8 * 1024];
        loop {
            let n = stdin.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            wr.write_all(&buf[..n]).await?;
        }
        wr.shutdown().await
    };
    let download = async {
        let mut stdout = tokio::io::stdout();
        tokio::io::copy(&mut rd, &mut stdout).await?;
        stdout.flush().await
    };
    let (up, down) = tokio::join!(upload, download);
    up.context("Failed to send to server")?;
    down.context("Failed to receive from server")?;
    Ok(())
}

async fn run_proxy(config: &Config) -> anyhow::Result<()> {
    let p = &config.proxy;
    let trust = tlsconf::build_default_server_trust_config(&p.ca_file, &p.cert_file, &p.key_file)
        .context("Failed to build proxy trust configuration")?;

    let mut server = proxy::new_proxy_server(p.listen_addr.clone(), p.upstream_addr.clone(), trust)?;
    let addr = server.start().await?;
    info!(addr = %addr, upstream = %p.upstream_addr, "mtlssh proxy running");

    shutdown_signal().await;
    server.shutdown().await;
    info!("Proxy shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

// ─────────────────────────────────────────────────────────────────────────────
// Certificates
// ─────────────────────────────────────────────────────────────────────────────

fn issue_options(args: &IssueArgs) -> Vec<CertOption> {
    let mut opts = Vec::new();
    if args.rsa {
        opts.push(cert::with_new_rsa_key());
    }
    if let Some(cn) = &args.cn {
        opts.push(cert::with_common_name(cn.clone()));
    }
    if !args.dns_names.is_empty() {
        opts.push(cert::with_dns_names(args.dns_names.clone()));
    }
    if !args.ip_addresses.is_empty() {
        opts.push(cert::with_ip_addresses(args.ip_addresses.clone()));
    }
    if let Some(days) = args.valid_days {
        opts.push(cert::is_valid_for(Duration::from_secs(days.saturating_mul(86_400))));
    }
    opts
}

fn read_issuer(issuer: &IssuerArgs) -> anyhow::Result<(Vec<u8>, Vec<u8>)> {
    let key = std::fs::read(&issuer.ca_key)
        .with_context(|| format!("Cannot read issuer key '{}'", issuer.ca_key.display()))?;
    let cert = std::fs::read(&issuer.ca_cert)
        .with_context(|| format!("Cannot read issuer certificate '{}'", issuer.ca_cert.display()))?;
    Ok((key, cert))
}

fn persist(generated: &GeneratedCert, args: &IssueArgs, default_prefix: &str) -> anyhow::Result<()> {
    let prefix = args.prefix.as_deref().unwrap_or(default_prefix);
    let paths = cert::write_to_dir(generated, Path::new(&args.out_dir), prefix)?;
    println!("certificate: {}", paths.cert.display());
    println!("private key: {}", paths.key.display());
    Ok(())
}

fn run_cert(cmd: CertCommand) -> anyhow::Result<()> {
    match cmd {
        CertCommand::Ca { issue } => {
            let ca = cert::new_ca(issue_options(&issue)).context("Failed to issue CA")?;
            persist(&ca, &issue, "ca")
        }
        CertCommand::Server { issue, issuer } => {
            let (key, cert_pem) = read_issuer(&issuer)?;
            let leaf = cert::new_server_from_ca(&key, &cert_pem, issue_options(&issue))
                .context("Failed to issue server certificate")?;
            persist(&leaf, &issue, "server")
        }
        CertCommand::Client { issue, issuer } => {
            let (key, cert_pem) = read_issuer(&issuer)?;
            let leaf = cert::new_client_from_ca(&key, &cert_pem, issue_options(&issue))
                .context("Failed to issue client certificate")?;
            persist(&leaf, &issue, "client")
        }
    }
}
