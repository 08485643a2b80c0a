#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use uploadq::config::Config;
use uploadq::credentials::Credentials;
use uploadq::daemon::RequestDaemon;
use uploadq::osc::Message;
use uploadq::protocol::{SHUTDOWN_SENTINEL, UPLOAD_START};
use uploadq::queue::UploadQueue;
use uploadq::storage::StorageBackend;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Storage backend that records calls and can hold uploads until released
pub struct FakeStorage {
    calls: AtomicUsize,
    gated: bool,
    fail: bool,
    entered: Notify,
    release: Notify,
}

impl FakeStorage {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::build(false, false))
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self::build(false, true))
    }

    /// Every upload blocks until [`FakeStorage::release`] is called
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::build(true, false))
    }

    fn build(gated: bool, fail: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            gated,
            fail,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wait until an upload has reached the backend
    pub async fn entered(&self) {
        tokio::time::timeout(TIMEOUT, self.entered.notified())
            .await
            .expect("upload should reach the backend");
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait::async_trait]
impl StorageBackend for FakeStorage {
    async fn upload_file(&self, _path: &Path, _credentials: &Credentials) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if self.gated {
            self.release.notified().await;
        }
        if self.fail {
            return Err(anyhow!("remote rejected the upload"));
        }
        Ok(())
    }
}

/// A daemon on a loopback port with a fake manager collecting its notifications
pub struct Harness {
    pub dir: TempDir,
    pub daemon_addr: SocketAddr,
    pub queue: UploadQueue,
    pub manager: UdpSocket,
    pub client: UdpSocket,
    pub running: JoinHandle<Result<()>>,
}

impl Harness {
    pub async fn start(storage: Arc<dyn StorageBackend>) -> Self {
        Self::start_with(storage, |_| {}).await
    }

    pub async fn start_with(
        storage: Arc<dyn StorageBackend>,
        configure: impl FnOnce(&mut Config),
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let manager = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let mut config = Config {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            manager_addr: manager.local_addr().unwrap(),
            credentials_path: dir.path().join("credentials.json"),
            mirror_dir: dir.path().join("mirror"),
            ..Config::default()
        };
        configure(&mut config);

        let daemon = RequestDaemon::bind(&config, storage).await.unwrap();
        let daemon_addr = daemon.local_addr().unwrap();
        let queue = daemon.queue().clone();
        let running = tokio::spawn(daemon.run());

        Self {
            dir,
            daemon_addr,
            queue,
            manager,
            client,
            running,
        }
    }

    /// Create a file of `len` bytes in the harness directory and return its path
    pub fn file(&self, name: &str, len: usize) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, vec![7u8; len]).unwrap();
        path.to_string_lossy().into_owned()
    }

    pub fn missing(&self, name: &str) -> String {
        let path: PathBuf = self.dir.path().join(name);
        path.to_string_lossy().into_owned()
    }

    pub async fn send_raw(&self, packet: &[u8]) {
        self.client.send_to(packet, self.daemon_addr).await.unwrap();
    }

    pub async fn send(&self, message: &Message) {
        self.send_raw(&message.encode()).await;
    }

    pub async fn request(&self, path: &str) {
        self.send(&Message::new(UPLOAD_START).arg(path)).await;
    }

    pub async fn next_notification(&self) -> Message {
        let mut buf = [0u8; 1024];
        let (len, _) = tokio::time::timeout(TIMEOUT, self.manager.recv_from(&mut buf))
            .await
            .expect("notification within timeout")
            .unwrap();
        Message::decode(&buf[..len]).unwrap()
    }

    /// Assert that nothing reaches the manager for `window`
    pub async fn assert_silent(&self, window: Duration) {
        let mut buf = [0u8; 1024];
        if let Ok(received) = tokio::time::timeout(window, self.manager.recv_from(&mut buf)).await
        {
            let (len, _) = received.unwrap();
            panic!(
                "unexpected notification: {:?}",
                Message::decode(&buf[..len])
            );
        }
    }

    /// Wait until the queue has no items left
    pub async fn wait_for_empty_queue(&self) {
        tokio::time::timeout(TIMEOUT, async {
            while !self.queue.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("queue should drain");
    }

    /// Send the shutdown sentinel and wait for the daemon to return
    pub async fn stop(self) -> Result<()> {
        self.send_raw(&[SHUTDOWN_SENTINEL]).await;
        tokio::time::timeout(TIMEOUT, self.running)
            .await
            .expect("daemon should stop")
            .unwrap()
    }
}
