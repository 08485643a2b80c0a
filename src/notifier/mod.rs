use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::osc::Message;
use crate::protocol::{ResultCode, AP_CONFIGURED, UPLOAD_STARTED, UPLOAD_STOPPED};

/// Handle for emitting status notifications to the manager.
///
/// Sending only enqueues the message; a single delivery task owns the socket and sends in
/// FIFO order. This makes the handle safe to use from queue observers.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Message>,
}

impl Notifier {
    /// A notifier plus the receiving end of its queue
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Bind an ephemeral socket and spawn the task delivering to `manager`.
    ///
    /// The task ends once every clone of the returned notifier is dropped and the queue
    /// has been flushed.
    pub async fn spawn(manager: SocketAddr) -> Result<(Self, JoinHandle<()>)> {
        let socket = ephemeral_socket(manager)
            .await
            .context("Failed to bind notification socket")?;

        let (notifier, rx) = Self::channel();
        let handle = tokio::spawn(deliver(socket, manager, rx));
        Ok((notifier, handle))
    }

    pub fn upload_started(&self, path: &str) {
        self.send(started_message(path));
    }

    pub fn upload_stopped(&self, result: ResultCode, path: &str, message: Option<&str>) {
        self.send(stopped_message(result, path, message));
    }

    /// `result` is forwarded as-is; 0 means success
    pub fn configured(&self, result: i32, message: Option<&str>) {
        self.send(configured_message(result, message));
    }

    pub fn send(&self, message: Message) {
        if let Err(err) = self.tx.send(message) {
            warn!("Notification channel closed, dropping {}", err.0);
        }
    }
}

/// Bind an unspecified-address socket of the same family as `peer` on a random port
pub async fn ephemeral_socket(peer: SocketAddr) -> std::io::Result<UdpSocket> {
    let bind_addr: SocketAddr = if peer.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };
    UdpSocket::bind(bind_addr).await
}

/// `/uploader/upload/started path`
pub fn started_message(path: &str) -> Message {
    Message::new(UPLOAD_STARTED).arg(path)
}

/// `/uploader/upload/stopped result path [message]`
pub fn stopped_message(result: ResultCode, path: &str, message: Option<&str>) -> Message {
    let msg = Message::new(UPLOAD_STOPPED).arg(result.code()).arg(path);
    match message.filter(|m| !m.is_empty()) {
        Some(text) => msg.arg(text),
        None => msg,
    }
}

/// `/ap_configurator/configure/configured result [message]`
pub fn configured_message(result: i32, message: Option<&str>) -> Message {
    let msg = Message::new(AP_CONFIGURED).arg(result);
    match message.filter(|m| !m.is_empty()) {
        Some(text) => msg.arg(text),
        None => msg,
    }
}

/// Drain `rx`, sending each message to `manager`. Send errors are logged and skipped.
pub async fn deliver(
    socket: UdpSocket,
    manager: SocketAddr,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = rx.recv().await {
        let packet = message.encode();
        debug!("send {} -> {}: {}", message, manager, hex::encode(&packet));

        if let Err(e) = socket.send_to(&packet, manager).await {
            warn!("Failed to notify {} of {}: {}", manager, message.address(), e);
        }
    }
    debug!("Notification channel closed");
}
