//! On-disk layout for issued material.
//!
//! `<prefix>.cert.pem` is world-readable; `<prefix>.priv.key.pem` is owner
//! read/write only on unix.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use super::builder::GeneratedCert;
use crate::{Error, Result};

/// Suffix of the certificate file.
pub const CERT_SUFFIX: &str = ".cert.pem";
/// Suffix of the private key file.
pub const KEY_SUFFIX: &str = ".priv.key.pem";

/// Paths of a persisted certificate/key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemPaths {
    /// Certificate file.
    pub cert: PathBuf,
    /// Private key file.
    pub key: PathBuf,
}

impl PemPaths {
    /// Where `prefix` lives under `dir`.
    pub fn new(dir: &Path, prefix: &str) -> Self {
        Self {
            cert: dir.join(format!("{prefix}{CERT_SUFFIX}")),
            key: dir.join(format!("{prefix}{KEY_SUFFIX}")),
        }
    }
}

/// Write `cert` under `dir`, creating the directory if needed.
pub fn write_to_dir(cert: &GeneratedCert, dir: &Path, prefix: &str) -> Result<PemPaths> {
    fs::create_dir_all(dir)
        .map_err(|e| Error::Config(format!("Cannot create dir '{}': {e}", dir.display())))?;

    let paths = PemPaths::new(dir, prefix);

    write_file(&paths.cert, cert.cert_pem.as_bytes(), 0o644)
        .map_err(|e| Error::Config(format!("Cannot write cert: {e}")))?;
    write_file(&paths.key, cert.key_pem.as_bytes(), 0o600)
        .map_err(|e| Error::Config(format!("Cannot write key: {e}")))?;

    info!(
        cert = %paths.cert.display(),
        key = %paths.key.display(),
        "Wrote certificate and key"
    );
    Ok(paths)
}

/// Read a pair written by [`write_to_dir`].
pub fn read_from_dir(dir: &Path, prefix: &str) -> Result<GeneratedCert> {
    let paths = PemPaths::new(dir, prefix);
    let read = |p: &Path| {
        fs::read_to_string(p)
            .map_err(|e| Error::Config(format!("Cannot read '{}': {e}", p.display())))
    };
    Ok(GeneratedCert {
        cert_pem: read(&paths.cert)?,
        key_pem: read(&paths.key)?,
    })
}

/// Create or truncate `path` with `mode` and write `contents`.
///
/// The mode is applied through the open handle before any byte is written,
/// so an existing file with looser permissions never holds the new content.
#[cfg(unix)]
fn write_file(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)?;
    file.set_permissions(fs::Permissions::from_mode(mode))?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_file(path: &Path, contents: &[u8], _mode: u32) -> std::io::Result<()> {
    fs::write(path, contents)
}
