//! One-shot upload tasks and the tracker that runs them.

use anyhow::anyhow;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::credentials::Credentials;
use crate::fault::{Fault, FileFault};
use crate::queue::{UploadQueue, UploadStatus};
use crate::storage::StorageBackend;

/// Limits and inputs shared by every worker
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_file_size: u64,
    pub credentials_path: PathBuf,
}

/// Performs a single upload attempt for one queued path.
///
/// The worker never touches the queue record directly; every outcome goes through
/// [`UploadQueue::set_status`].
pub struct UploadWorker {
    queue: UploadQueue,
    pathname: String,
    storage: Arc<dyn StorageBackend>,
    settings: Arc<WorkerSettings>,
}

impl UploadWorker {
    pub fn new(
        queue: UploadQueue,
        pathname: String,
        storage: Arc<dyn StorageBackend>,
        settings: Arc<WorkerSettings>,
    ) -> Self {
        Self {
            queue,
            pathname,
            storage,
            settings,
        }
    }

    /// Run the attempt to completion and record `Done` or `Error` in the queue.
    /// Returns whether the upload succeeded.
    pub async fn run(self) -> bool {
        info!("⬆️ Upload worker started for {}", self.pathname);
        let started = Instant::now();

        let result = self.attempt().await;
        let status = match &result {
            Ok(()) => UploadStatus::Done,
            Err(fault) => {
                error!("❌ {}", fault);
                UploadStatus::Error
            }
        };

        if !self.queue.set_status(&self.pathname, status) {
            debug!("{} left the queue before its outcome was recorded", self.pathname);
        }

        info!(
            "Upload worker finished for {}: {} after {:.2?}",
            self.pathname,
            status,
            started.elapsed()
        );
        result.is_ok()
    }

    async fn attempt(&self) -> Result<(), Fault> {
        if !self.queue.contains(&self.pathname) {
            return Err(Fault::Stale(self.pathname.clone()));
        }

        let path = PathBuf::from(&self.pathname);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FileFault::Missing(path).into());
            }
            Err(source) => return Err(FileFault::Unreadable { path, source }.into()),
        };

        let limit = self.settings.max_file_size;
        if metadata.len() > limit {
            return Err(FileFault::Oversize {
                path,
                size: metadata.len(),
                limit,
            }
            .into());
        }

        if !self.queue.set_status(&self.pathname, UploadStatus::Processing) {
            return Err(Fault::Stale(self.pathname.clone()));
        }

        let credentials = match Credentials::load_async(&self.settings.credentials_path).await {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!("{:#}; continuing with empty credentials", e);
                Credentials::default()
            }
        };

        // Separate task so a panicking backend fails this upload instead of the worker.
        // The guard ties its lifetime to the worker's, so aborting the worker aborts it too.
        let storage = Arc::clone(&self.storage);
        let mut transfer = AbortOnDrop(tokio::spawn(async move {
            storage.upload_file(&path, &credentials).await
        }));

        match (&mut transfer.0).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Fault::Upload(e)),
            Err(e) => Err(Fault::Upload(anyhow!("storage backend aborted: {e}"))),
        }
    }
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Tracks running upload tasks so shutdown can wait for or abort them.
///
/// With `max_concurrent` set, workers queue on a semaphore before running; their items
/// stay `Waiting` meanwhile. Without it every admitted upload runs immediately.
pub struct UploadTasks {
    runtime: Handle,
    tasks: Mutex<JoinSet<()>>,
    permits: Option<Arc<Semaphore>>,
}

impl UploadTasks {
    pub fn new(runtime: Handle, max_concurrent: Option<usize>) -> Self {
        Self {
            runtime,
            tasks: Mutex::new(JoinSet::new()),
            permits: max_concurrent.map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    /// Start `worker` in the background. Never blocks.
    pub fn spawn(&self, worker: UploadWorker) {
        let span = info_span!("upload", id = %Uuid::new_v4());
        let permits = self.permits.clone();

        let task = async move {
            let _permit = match permits {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };
            worker.run().await;
        };

        let mut tasks = self.lock();
        while tasks.try_join_next().is_some() {}
        tasks.spawn_on(task.instrument(span), &self.runtime);
    }

    /// Number of uploads that have not finished yet
    pub fn in_flight(&self) -> usize {
        let mut tasks = self.lock();
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Wait up to `timeout` for running uploads, then abort the rest.
    /// Returns how many were abandoned.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let mut tasks = std::mem::take(&mut *self.lock());
        if tasks.is_empty() {
            return 0;
        }

        let _ = tokio::time::timeout(timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        let abandoned = tasks.len();
        tasks.abort_all();
        abandoned
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
