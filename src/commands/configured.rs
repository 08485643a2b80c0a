use anyhow::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

use crate::notifier::Notifier;

/// Command to report the outcome of applying network settings to the manager
pub struct ConfiguredCommand {
    result: i32,
    message: Option<String>,
    manager_addr: SocketAddr,
}

impl ConfiguredCommand {
    pub fn new(result: i32, message: Option<String>, manager_addr: SocketAddr) -> Self {
        Self {
            result,
            message,
            manager_addr,
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let (notifier, delivery) = Notifier::spawn(self.manager_addr).await?;
        notifier.configured(self.result, self.message.as_deref());
        drop(notifier);

        tokio::time::timeout(Duration::from_secs(5), delivery).await??;
        info!(
            "📡 Reported configuration result {} to {}",
            self.result, self.manager_addr
        );
        Ok(())
    }
}
