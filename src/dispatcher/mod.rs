use std::sync::Arc;
use tracing::debug;

use crate::notifier::Notifier;
use crate::protocol::ResultCode;
use crate::queue::{QueueObserver, UploadItem, UploadQueue, UploadStatus};
use crate::storage::StorageBackend;
use crate::worker::{UploadTasks, UploadWorker, WorkerSettings};

/// Queue policy: starts workers for waiting items, reports finished ones and evicts them.
///
/// Runs under the queue lock, so it only spawns tasks and enqueues notifications.
pub struct Dispatcher {
    notifier: Notifier,
    storage: Arc<dyn StorageBackend>,
    settings: Arc<WorkerSettings>,
    tasks: Arc<UploadTasks>,
}

impl Dispatcher {
    pub fn new(
        notifier: Notifier,
        storage: Arc<dyn StorageBackend>,
        settings: WorkerSettings,
        tasks: Arc<UploadTasks>,
    ) -> Self {
        Self {
            notifier,
            storage,
            settings: Arc::new(settings),
            tasks,
        }
    }

    fn start_worker(&self, queue: &UploadQueue, item: &UploadItem) {
        let worker = UploadWorker::new(
            queue.clone(),
            item.pathname.clone(),
            Arc::clone(&self.storage),
            Arc::clone(&self.settings),
        );
        self.tasks.spawn(worker);
    }
}

impl QueueObserver for Dispatcher {
    fn on_add(&self, queue: &UploadQueue, item: &UploadItem) -> bool {
        debug!("queue add: {}, {}", item.pathname, item.status);
        if item.status != UploadStatus::Waiting {
            return false;
        }

        // Enqueued before the worker exists so "started" always precedes "stopped".
        self.notifier.upload_started(&item.pathname);
        self.start_worker(queue, item);
        true
    }

    fn on_change(&self, queue: &UploadQueue, item: &UploadItem) -> bool {
        debug!("queue change: {}, {}", item.pathname, item.status);
        match item.status {
            UploadStatus::Waiting => {
                self.start_worker(queue, item);
                true
            }
            UploadStatus::Processing => true,
            UploadStatus::Done => {
                self.notifier.upload_stopped(ResultCode::Success, &item.pathname, None);
                false
            }
            UploadStatus::Error => {
                // No retry: the item is evicted and a new request starts over.
                self.notifier.upload_stopped(ResultCode::Failure, &item.pathname, None);
                false
            }
        }
    }

    fn on_remove(&self, _queue: &UploadQueue, item: &UploadItem) {
        debug!("queue remove: {}, {}", item.pathname, item.status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;
    use crate::notifier::{started_message, stopped_message};
    use crate::osc::Message;
    use anyhow::Result;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::runtime::Handle;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::Semaphore;

    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl StorageBackend for CountingBackend {
        async fn upload_file(&self, _path: &Path, _credentials: &Credentials) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Holds every upload until permits are added to `release`
    struct GatedBackend {
        calls: AtomicUsize,
        release: Semaphore,
    }

    #[async_trait::async_trait]
    impl StorageBackend for GatedBackend {
        async fn upload_file(&self, _path: &Path, _credentials: &Credentials) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.acquire().await?.forget();
            Ok(())
        }
    }

    async fn wait_for_calls(backend: &GatedBackend, calls: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while backend.calls.load(Ordering::SeqCst) < calls {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("backend reached");
    }

    struct Fixture {
        dir: TempDir,
        queue: UploadQueue,
        tasks: Arc<UploadTasks>,
        backend: Arc<CountingBackend>,
        notifications: UnboundedReceiver<Message>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let (notifier, notifications) = Notifier::channel();
            let backend = Arc::new(CountingBackend {
                calls: AtomicUsize::new(0),
            });
            let tasks = Arc::new(UploadTasks::new(Handle::current(), None));
            let dispatcher = Dispatcher::new(
                notifier,
                backend.clone(),
                WorkerSettings {
                    max_file_size: 1024,
                    credentials_path: dir.path().join("credentials.json"),
                },
                tasks.clone(),
            );
            Self {
                dir,
                queue: UploadQueue::new(Arc::new(dispatcher)),
                tasks,
                backend,
                notifications,
            }
        }

        fn file(&self, name: &str, len: usize) -> String {
            let path = self.dir.path().join(name);
            std::fs::write(&path, vec![0u8; len]).unwrap();
            path.to_string_lossy().into_owned()
        }

        async fn next_notification(&mut self) -> Message {
            tokio::time::timeout(Duration::from_secs(5), self.notifications.recv())
                .await
                .expect("notification within timeout")
                .expect("notifier alive")
        }
    }

    #[tokio::test]
    async fn test_add_starts_worker_and_reports_success() {
        let mut fx = Fixture::new();
        let path = fx.file("photo.jpg", 100);

        assert!(fx.queue.add(&path));

        assert_eq!(fx.next_notification().await, started_message(&path));
        assert_eq!(
            fx.next_notification().await,
            stopped_message(ResultCode::Success, &path, None)
        );
        assert_eq!(fx.tasks.drain(Duration::from_secs(5)).await, 0);
        assert!(fx.queue.is_empty());
        assert_eq!(fx.backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_upload_reports_failure_and_evicts() {
        let mut fx = Fixture::new();
        let path = fx.file("big.mov", 2048);

        assert!(fx.queue.add(&path));

        assert_eq!(fx.next_notification().await, started_message(&path));
        assert_eq!(
            fx.next_notification().await,
            stopped_message(ResultCode::Failure, &path, None)
        );
        fx.tasks.drain(Duration::from_secs(5)).await;
        assert!(fx.queue.is_empty());
        assert_eq!(fx.backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_distinct_adds_spawn_one_worker_each() {
        let mut fx = Fixture::new();
        let paths: Vec<_> = (0..8).map(|i| fx.file(&format!("{i}.jpg"), 10)).collect();

        for path in &paths {
            assert!(fx.queue.add(path));
        }
        fx.tasks.drain(Duration::from_secs(5)).await;

        assert_eq!(fx.backend.calls.load(Ordering::SeqCst), 8);
        assert!(fx.queue.is_empty());

        let mut started = 0;
        let mut stopped = 0;
        while let Ok(msg) = fx.notifications.try_recv() {
            match msg.address() {
                crate::protocol::UPLOAD_STARTED => started += 1,
                crate::protocol::UPLOAD_STOPPED => stopped += 1,
                other => panic!("unexpected notification {other}"),
            }
        }
        assert_eq!((started, stopped), (8, 8));
    }

    #[tokio::test]
    async fn test_reset_to_waiting_starts_another_worker() {
        let dir = TempDir::new().unwrap();
        let (notifier, mut notifications) = Notifier::channel();
        let backend = Arc::new(GatedBackend {
            calls: AtomicUsize::new(0),
            release: Semaphore::new(0),
        });
        let tasks = Arc::new(UploadTasks::new(Handle::current(), None));
        let queue = UploadQueue::new(Arc::new(Dispatcher::new(
            notifier,
            backend.clone(),
            WorkerSettings {
                max_file_size: 1024,
                credentials_path: dir.path().join("credentials.json"),
            },
            tasks.clone(),
        )));
        let path = dir.path().join("clip.mov");
        std::fs::write(&path, b"movie").unwrap();
        let path = path.to_string_lossy().into_owned();

        assert!(queue.add(&path));
        wait_for_calls(&backend, 1).await;
        assert_eq!(queue.status(&path), Some(UploadStatus::Processing));

        assert!(queue.set_status(&path, UploadStatus::Waiting));
        wait_for_calls(&backend, 2).await;
        assert_eq!(queue.status(&path), Some(UploadStatus::Processing));
        assert_eq!(tasks.in_flight(), 2);

        backend.release.add_permits(2);
        assert_eq!(tasks.drain(Duration::from_secs(5)).await, 0);
        assert!(queue.is_empty());

        // The first worker to finish evicts the item; the other finds it gone
        let mut received = Vec::new();
        while let Ok(message) = notifications.try_recv() {
            received.push(message);
        }
        assert_eq!(
            received,
            vec![
                started_message(&path),
                stopped_message(ResultCode::Success, &path, None)
            ]
        );
    }
}
