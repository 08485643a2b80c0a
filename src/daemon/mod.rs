use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::fault::{Fault, ValidationFault};
use crate::notifier::Notifier;
use crate::osc::{Argument, Message};
use crate::protocol::{ResultCode, MAX_DATAGRAM_SIZE, SHUTDOWN_SENTINEL, UPLOAD_START};
use crate::queue::UploadQueue;
use crate::storage::StorageBackend;
use crate::worker::{UploadTasks, WorkerSettings};

/// Upper bound on flushing queued notifications during shutdown
const NOTIFY_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Receives upload requests over UDP and feeds them into the upload queue.
pub struct RequestDaemon {
    socket: UdpSocket,
    queue: UploadQueue,
    notifier: Notifier,
    tasks: Arc<UploadTasks>,
    delivery: JoinHandle<()>,
    drain_timeout: Duration,
}

impl RequestDaemon {
    /// Bind the request socket and wire the queue, dispatcher and notifier together
    pub async fn bind(config: &Config, storage: Arc<dyn StorageBackend>) -> Result<Self> {
        let socket = UdpSocket::bind(config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind request socket on {}", config.listen_addr))?;

        let (notifier, delivery) = Notifier::spawn(config.manager_addr).await?;
        let tasks = Arc::new(UploadTasks::new(
            Handle::current(),
            config.max_concurrent_uploads,
        ));
        let dispatcher = Dispatcher::new(
            notifier.clone(),
            storage,
            WorkerSettings {
                max_file_size: config.max_file_size,
                credentials_path: config.credentials_path.clone(),
            },
            Arc::clone(&tasks),
        );

        Ok(Self {
            socket,
            queue: UploadQueue::new(Arc::new(dispatcher)),
            notifier,
            tasks,
            delivery,
            drain_timeout: config.drain_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }

    /// Serve until the shutdown sentinel arrives, then wind down.
    pub async fn run(self) -> Result<()> {
        let listen = self.local_addr()?;
        let span = info_span!("daemon", %listen);

        async move {
            info!("✅ Request daemon listening on {}", listen);
            let served = self.serve().await;
            self.shutdown().await;
            info!("Request daemon stopped");
            served
        }
        .instrument(span)
        .await
    }

    async fn serve(&self) -> Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused
                    ) =>
                {
                    debug!("Ignoring transient receive error: {}", e);
                    continue;
                }
                Err(e) => return Err(e).context("Failed to receive request"),
            };

            let data = &buf[..len];
            debug!("recv {} bytes from {}: {}", len, peer, hex::encode(data));

            if data == [SHUTDOWN_SENTINEL] {
                info!("🛑 Shutdown requested by {}", peer);
                return Ok(());
            }

            self.handle_datagram(data);
        }
    }

    fn handle_datagram(&self, data: &[u8]) {
        let message = match Message::decode(data) {
            Ok(message) => message,
            Err(e) => {
                error!("{}", Fault::from(e));
                return;
            }
        };

        let path = match parse_upload_request(&message) {
            Ok(path) => path,
            Err(fault) => {
                self.reject(&message, fault);
                return;
            }
        };

        if self.queue.add(&path) {
            info!("📥 Queued upload: {}", path);
        } else {
            error!("{}", Fault::Duplicate(path.clone()));
            self.notifier.upload_stopped(ResultCode::Failure, &path, None);
        }
    }

    fn reject(&self, message: &Message, fault: ValidationFault) {
        match salvage_path(message) {
            Some(path) => {
                error!("{} (path {:?})", Fault::Validation(fault), path);
                self.notifier.upload_stopped(ResultCode::Failure, path, None);
            }
            None => {
                error!("{}", Fault::Unaddressable(fault));
                self.notifier.upload_stopped(ResultCode::Failure, "", None);
            }
        }
    }

    async fn shutdown(self) {
        let in_flight = self.tasks.in_flight();
        if in_flight > 0 {
            info!(
                "Waiting up to {:?} for {} in-flight uploads",
                self.drain_timeout, in_flight
            );
        }

        let abandoned = self.tasks.drain(self.drain_timeout).await;
        if abandoned > 0 {
            warn!(
                "Abandoned {} in-flight uploads; their outcome will not be reported",
                abandoned
            );
        }

        let Self {
            queue,
            notifier,
            delivery,
            ..
        } = self;
        drop(queue);
        drop(notifier);

        if tokio::time::timeout(NOTIFY_FLUSH_TIMEOUT, delivery)
            .await
            .is_err()
        {
            debug!("Notification delivery still busy at shutdown");
        }
    }
}

/// Extract the path from a well-formed `/uploader/upload/start` request
pub fn parse_upload_request(message: &Message) -> Result<String, ValidationFault> {
    if message.address() != UPLOAD_START {
        return Err(ValidationFault::UnknownAddress(message.address().to_string()));
    }

    match message.args() {
        [Argument::Str(path)] => Ok(path.clone()),
        [other] => Err(ValidationFault::ArgumentType(other.tag())),
        args => Err(ValidationFault::ArgumentCount(args.len())),
    }
}

/// Best-effort path for answering a rejected request: the first argument, if it is a string
pub fn salvage_path(message: &Message) -> Option<&str> {
    message.args().first().and_then(Argument::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_request() {
        let msg = Message::new(UPLOAD_START).arg("/mnt/usb/photo.jpg");
        assert_eq!(parse_upload_request(&msg).unwrap(), "/mnt/usb/photo.jpg");
    }

    #[test]
    fn test_parse_unknown_address() {
        let msg = Message::new("/uploader/upload/cancel").arg("/mnt/usb/photo.jpg");
        assert_eq!(
            parse_upload_request(&msg).unwrap_err(),
            ValidationFault::UnknownAddress("/uploader/upload/cancel".into())
        );
        assert_eq!(salvage_path(&msg), Some("/mnt/usb/photo.jpg"));
    }

    #[test]
    fn test_parse_wrong_argument_count() {
        let msg = Message::new(UPLOAD_START).arg("/a").arg("/b");
        assert_eq!(
            parse_upload_request(&msg).unwrap_err(),
            ValidationFault::ArgumentCount(2)
        );
        assert_eq!(salvage_path(&msg), Some("/a"));

        let msg = Message::new(UPLOAD_START);
        assert_eq!(
            parse_upload_request(&msg).unwrap_err(),
            ValidationFault::ArgumentCount(0)
        );
        assert_eq!(salvage_path(&msg), None);
    }

    #[test]
    fn test_parse_wrong_argument_type() {
        let msg = Message::new(UPLOAD_START).arg(42);
        assert_eq!(
            parse_upload_request(&msg).unwrap_err(),
            ValidationFault::ArgumentType('i')
        );
        assert_eq!(salvage_path(&msg), None);
    }
}
