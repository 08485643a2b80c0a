use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tracing::debug;

/// Lifecycle of one upload: `Waiting → Processing → {Done | Error}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Waiting,
    Processing,
    Done,
    Error,
}

impl UploadStatus {
    /// `Done` and `Error` end an item's presence in the queue
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Done | UploadStatus::Error)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStatus::Waiting => "waiting",
            UploadStatus::Processing => "processing",
            UploadStatus::Done => "done",
            UploadStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// A pending upload, keyed by its absolute path
#[derive(Debug, Clone, PartialEq)]
pub struct UploadItem {
    pub pathname: String,
    pub status: UploadStatus,
    /// When the item was admitted. Informational only.
    pub entry_time: SystemTime,
}

impl UploadItem {
    fn new(pathname: &str) -> Self {
        Self {
            pathname: pathname.to_string(),
            status: UploadStatus::Waiting,
            entry_time: SystemTime::now(),
        }
    }
}

/// Policy hooks invoked by [`UploadQueue`] while its lock is held.
///
/// Implementations must return quickly: no blocking, no I/O, and no calls back into the
/// queue (the lock is not reentrant). Spawning a task or pushing onto a channel is fine.
pub trait QueueObserver: Send + Sync {
    /// Called before a new item is inserted. Returning `false` discards it.
    fn on_add(&self, queue: &UploadQueue, item: &UploadItem) -> bool;

    /// Called after an item's status changed. Returning `false` evicts it.
    fn on_change(&self, queue: &UploadQueue, item: &UploadItem) -> bool;

    /// Called when an item leaves the queue.
    fn on_remove(&self, queue: &UploadQueue, item: &UploadItem);
}

/// Ordered, path-unique set of pending uploads with serialized mutation.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct UploadQueue {
    inner: Arc<Inner>,
}

struct Inner {
    items: Mutex<Vec<UploadItem>>,
    observer: Arc<dyn QueueObserver>,
}

impl UploadQueue {
    pub fn new(observer: Arc<dyn QueueObserver>) -> Self {
        Self {
            inner: Arc::new(Inner {
                items: Mutex::new(Vec::new()),
                observer,
            }),
        }
    }

    /// Admit `pathname` in `Waiting` state.
    ///
    /// Returns `false` if the path is already queued or the observer rejects it.
    pub fn add(&self, pathname: &str) -> bool {
        let mut items = self.lock();
        if items.iter().any(|item| item.pathname == pathname) {
            debug!("Rejecting duplicate queue entry: {}", pathname);
            return false;
        }

        let item = UploadItem::new(pathname);
        if !self.inner.observer.on_add(self, &item) {
            debug!("Observer declined queue entry: {}", pathname);
            return false;
        }

        items.push(item);
        true
    }

    /// Remove `pathname`. Returns `true` if it was present.
    pub fn remove(&self, pathname: &str) -> bool {
        let mut items = self.lock();
        let Some(idx) = items.iter().position(|item| item.pathname == pathname) else {
            return false;
        };

        let item = items.remove(idx);
        self.inner.observer.on_remove(self, &item);
        true
    }

    /// Move `pathname` to `status`.
    ///
    /// Unchanged status is a successful no-op. If the observer declines the new state the
    /// item is evicted before this returns. Returns `false` only if the path is unknown.
    pub fn set_status(&self, pathname: &str, status: UploadStatus) -> bool {
        let mut items = self.lock();
        let Some(idx) = items.iter().position(|item| item.pathname == pathname) else {
            return false;
        };

        if items[idx].status == status {
            return true;
        }

        debug!("{}: {} -> {}", pathname, items[idx].status, status);
        items[idx].status = status;

        if !self.inner.observer.on_change(self, &items[idx]) {
            self.inner.observer.on_remove(self, &items[idx]);
            items.remove(idx);
        }
        true
    }

    pub fn contains(&self, pathname: &str) -> bool {
        self.lock().iter().any(|item| item.pathname == pathname)
    }

    pub fn status(&self, pathname: &str) -> Option<UploadStatus> {
        self.lock()
            .iter()
            .find(|item| item.pathname == pathname)
            .map(|item| item.status)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current items in insertion order
    pub fn snapshot(&self) -> Vec<UploadItem> {
        self.lock().clone()
    }

    // A panic inside an observer leaves the list itself consistent, so poisoning is
    // not propagated.
    fn lock(&self) -> MutexGuard<'_, Vec<UploadItem>> {
        self.inner
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for UploadQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for item in self.lock().iter() {
            write!(f, "[{}, {}]", item.pathname, item.status)?;
        }
        write!(f, "]")
    }
}
