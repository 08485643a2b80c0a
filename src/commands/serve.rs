use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use crate::config::Config;
use crate::daemon::RequestDaemon;
use crate::protocol::SHUTDOWN_SENTINEL;
use crate::storage::LocalMirror;

use super::send_datagram;

/// Command to run the request daemon in the foreground
pub struct ServeCommand {
    config: Config,
}

impl ServeCommand {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn execute(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.mirror_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create mirror directory {:?}",
                    self.config.mirror_dir
                )
            })?;

        info!(
            "Uploads mirror into {:?} under {}",
            self.config.mirror_dir, self.config.remote_prefix
        );
        info!("Notifications go to {}", self.config.manager_addr);
        match self.config.max_concurrent_uploads {
            Some(limit) => info!("At most {} concurrent uploads", limit),
            None => info!("Concurrent uploads are unbounded"),
        }

        let storage = Arc::new(LocalMirror::new(
            self.config.mirror_dir.clone(),
            self.config.remote_prefix.clone(),
        ));
        let daemon = RequestDaemon::bind(&self.config, storage).await?;
        let self_addr = reachable(daemon.local_addr()?);

        let mut running = tokio::spawn(daemon.run());

        tokio::select! {
            result = &mut running => return result?,
            _ = signal::ctrl_c() => {
                info!("🛑 Interrupt received, stopping daemon");
            }
        }

        // Route the interrupt through the regular shutdown path
        send_datagram(self_addr, &[SHUTDOWN_SENTINEL]).await?;
        running.await?
    }
}

/// Turn a wildcard bind address into one a local client can send to
fn reachable(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}
