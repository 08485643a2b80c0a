use anyhow::Result;
use std::net::SocketAddr;
use tracing::info;

use crate::protocol::SHUTDOWN_SENTINEL;

use super::send_datagram;

/// Command to stop a running daemon
pub struct StopCommand {
    daemon_addr: SocketAddr,
}

impl StopCommand {
    pub fn new(daemon_addr: SocketAddr) -> Self {
        Self { daemon_addr }
    }

    pub async fn execute(&self) -> Result<()> {
        send_datagram(self.daemon_addr, &[SHUTDOWN_SENTINEL]).await?;
        info!("🛑 Sent shutdown request to {}", self.daemon_addr);
        Ok(())
    }
}
