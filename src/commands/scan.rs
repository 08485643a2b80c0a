use anyhow::{anyhow, Context, Result};
use glob::Pattern;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::request::{absolute_path, send_request};

/// Command to request uploads for every file under a mounted volume
pub struct ScanCommand {
    root: PathBuf,
    pattern: Option<Pattern>,
    include_hidden: bool,
    daemon_addr: SocketAddr,
}

impl ScanCommand {
    pub fn new(
        root: PathBuf,
        pattern: Option<&str>,
        include_hidden: bool,
        daemon_addr: SocketAddr,
    ) -> Result<Self> {
        let pattern = pattern
            .map(Pattern::new)
            .transpose()
            .context("Invalid --pattern")?;
        Ok(Self {
            root,
            pattern,
            include_hidden,
            daemon_addr,
        })
    }

    pub async fn execute(&self) -> Result<()> {
        if !self.root.exists() {
            return Err(anyhow!("Directory does not exist: {:?}", self.root));
        }

        if !self.root.is_dir() {
            return Err(anyhow!("Path is not a directory: {:?}", self.root));
        }

        info!("🔎 Scanning directory: {:?}", self.root);

        let files = self.collect_files();
        if files.is_empty() {
            info!("No matching files found.");
            return Ok(());
        }

        let mut requested = 0;
        for file in &files {
            let path = match absolute_path(file) {
                Ok(path) => path,
                Err(e) => {
                    warn!("Skipping {:?}: {}", file, e);
                    continue;
                }
            };
            send_request(self.daemon_addr, &path).await?;
            debug!("Requested upload: {}", path);
            requested += 1;
        }

        info!(
            "✅ Requested {} uploads from {} files found.",
            requested,
            files.len()
        );
        Ok(())
    }

    /// Regular files under the root, sorted, filtered by pattern and visibility
    pub fn collect_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || self.include_hidden || !is_hidden(entry.path())
            })
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.matches(path))
            .collect();
        files.sort();
        files
    }

    fn matches(&self, path: &Path) -> bool {
        match (&self.pattern, path.file_name().and_then(|n| n.to_str())) {
            (Some(pattern), Some(name)) => pattern.matches(name),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// Dotfiles and dot-directories, including `._*` resource forks left by macOS
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}
