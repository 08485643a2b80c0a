pub mod configured;
pub mod credentials;
pub mod monitor;
pub mod request;
pub mod scan;
pub mod serve;
pub mod stop;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tracing::debug;

use crate::notifier::ephemeral_socket;

/// Send one datagram from an ephemeral socket
pub(crate) async fn send_datagram(target: SocketAddr, packet: &[u8]) -> Result<()> {
    let socket = ephemeral_socket(target)
        .await
        .context("Failed to bind client socket")?;
    socket
        .send_to(packet, target)
        .await
        .with_context(|| format!("Failed to send datagram to {target}"))?;
    debug!(
        "sent {} bytes to {}: {}",
        packet.len(),
        target,
        hex::encode(packet)
    );
    Ok(())
}
