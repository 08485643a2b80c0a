use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{info, warn};

use crate::osc::Message;
use crate::protocol::MAX_DATAGRAM_SIZE;

/// Command to listen like the manager and print every notification received
pub struct MonitorCommand {
    listen_addr: SocketAddr,
    count: Option<usize>,
}

impl MonitorCommand {
    pub fn new(listen_addr: SocketAddr, count: Option<usize>) -> Self {
        Self { listen_addr, count }
    }

    pub async fn execute(&self) -> Result<()> {
        let socket = UdpSocket::bind(self.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.listen_addr))?;
        info!("👂 Listening for notifications on {}", self.listen_addr);

        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let mut received = 0;
        while self.count.map_or(true, |limit| received < limit) {
            let (len, peer) = socket.recv_from(&mut buf).await?;
            match Message::decode(&buf[..len]) {
                Ok(message) => println!("{message}"),
                Err(e) => warn!("Undecodable datagram from {}: {}", peer, e),
            }
            received += 1;
        }
        Ok(())
    }
}
