use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::osc::Message;
use crate::protocol::UPLOAD_START;

use super::send_datagram;

/// Command to ask the daemon to upload specific files
pub struct RequestCommand {
    paths: Vec<PathBuf>,
    daemon_addr: SocketAddr,
}

impl RequestCommand {
    pub fn new(paths: Vec<PathBuf>, daemon_addr: SocketAddr) -> Self {
        Self { paths, daemon_addr }
    }

    pub async fn execute(&self) -> Result<()> {
        if self.paths.is_empty() {
            return Err(anyhow!("No files given"));
        }

        for path in &self.paths {
            let absolute = absolute_path(path)?;
            send_request(self.daemon_addr, &absolute).await?;
            info!("📤 Requested upload: {}", absolute);
        }
        Ok(())
    }
}

/// Send a single `/uploader/upload/start` request
pub async fn send_request(daemon_addr: SocketAddr, path: &str) -> Result<()> {
    let packet = Message::new(UPLOAD_START).arg(path).encode();
    send_datagram(daemon_addr, &packet).await
}

/// The daemon keys uploads by absolute path, so relative paths are resolved here
pub fn absolute_path(path: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    absolute
        .to_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Path is not valid UTF-8: {:?}", absolute))
}
