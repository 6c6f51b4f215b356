//! Certificate and key files on disk
//!
//! Certificates live at `<cert_dir>/<first name>.crt` with the private key
//! next to them as `<first name>.key`. Files are written with mode 0600 and
//! directories are created with mode 0700. Writes overwrite in place.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::traits::IssuedCertificate;

/// Paths of one domain group's certificate artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPaths {
    /// PEM certificate chain
    pub certificate: PathBuf,
    /// PEM private key
    pub private_key: PathBuf,
}

/// Derive the artifact paths for a domain group
///
/// Only the first name matters; a wildcard name keeps its `*` verbatim.
pub fn cert_paths(cert_dir: &Path, names: &[String]) -> CertPaths {
    let base = names.first().map(String::as_str).unwrap_or_default();
    CertPaths {
        certificate: cert_dir.join(format!("{}.crt", base)),
        private_key: cert_dir.join(format!("{}.key", base)),
    }
}

/// Create a directory (and parents) if missing, mode 0700 on unix
pub async fn ensure_dir(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);

    builder.create(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to create directory {}: {}", path.display(), e),
        ))
    })
}

/// Write a file readable only by its owner, replacing any previous content
pub async fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let with_context = |e: std::io::Error| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to write {}: {}", path.display(), e),
        ))
    };

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await.map_err(with_context)?;
    file.write_all(contents).await.map_err(with_context)?;
    file.flush().await.map_err(with_context)?;

    // mode() only applies on creation
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(with_context)?;
    }

    Ok(())
}

/// Persist an issued certificate and its key
pub async fn save_certificate(paths: &CertPaths, issued: &IssuedCertificate) -> Result<()> {
    write_private(&paths.certificate, issued.certificate.as_bytes()).await?;
    write_private(&paths.private_key, issued.private_key.as_bytes()).await?;
    Ok(())
}
