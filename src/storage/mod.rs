use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::credentials::Credentials;

/// The cloud storage capability consumed by upload workers.
///
/// `Ok(())` means the bytes at `path` are durably stored remotely under the name given by
/// [`remote_key`], with the source modification time preserved.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    async fn upload_file(&self, path: &Path, credentials: &Credentials) -> Result<()>;
}

/// Remote name for a local file: the prefix followed by the file's base name
pub fn remote_key(prefix: &str, path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("No usable file name in {path:?}"))?;

    if prefix.ends_with('/') {
        Ok(format!("{prefix}{name}"))
    } else {
        Ok(format!("{prefix}/{name}"))
    }
}

/// Backend that mirrors uploads into a local directory tree.
///
/// Stands in for the cloud client: files land at `<root>/<prefix>/<basename>`, existing
/// copies are overwritten, and credentials are not consulted.
pub struct LocalMirror {
    root: PathBuf,
    prefix: String,
}

impl LocalMirror {
    pub fn new(root: PathBuf, prefix: String) -> Self {
        Self { root, prefix }
    }

    /// Where `path` ends up inside the mirror
    pub fn destination(&self, path: &Path) -> Result<PathBuf> {
        let key = remote_key(&self.prefix, path)?;
        Ok(self.root.join(key.trim_start_matches('/')))
    }
}

#[async_trait::async_trait]
impl StorageBackend for LocalMirror {
    async fn upload_file(&self, path: &Path, _credentials: &Credentials) -> Result<()> {
        let destination = self.destination(path)?;

        let modified = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat {path:?}"))?
            .modified()?;
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {path:?}"))?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&destination, &data)
            .await
            .with_context(|| format!("Failed to write {destination:?}"))?;

        let file = std::fs::OpenOptions::new().write(true).open(&destination)?;
        tokio::task::spawn_blocking(move || file.set_modified(modified))
            .await?
            .context("Failed to preserve modification time")?;

        debug!(
            "Mirrored {:?} -> {:?} ({} bytes)",
            path,
            destination,
            data.len()
        );
        Ok(())
    }
}
