//! Reader/writer locks keyed by cache identity
//!
//! One lock per distinct cache, created on first use and kept for the life
//! of the registry. Guards release on drop. A second, per-identity slot
//! serializes deploy transactions without blocking readers.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{
    Mutex as AsyncMutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock,
};
use tracing::trace;

/// Lock access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => write!(f, "shared"),
            Self::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// Receives hold-interval events.
///
/// `acquired` fires after the lock is held; `released` fires before it is
/// let go, so recorded intervals never under-report a hold.
pub trait LockObserver: Send + Sync {
    fn acquired(&self, id: &Path, mode: LockMode);
    fn released(&self, id: &Path, mode: LockMode);
}

struct Slot {
    rw: Arc<RwLock<()>>,
    deploy: Arc<AsyncMutex<()>>,
}

/// Process-wide table of cache locks, owned by the worker
#[derive(Default)]
pub struct LockRegistry {
    slots: Mutex<HashMap<PathBuf, Arc<Slot>>>,
    observer: Option<Arc<dyn LockObserver>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that reports every acquire and release to `observer`
    pub fn with_observer(observer: Arc<dyn LockObserver>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            observer: Some(observer),
        }
    }

    fn slot(&self, id: &Path) -> Arc<Slot> {
        let mut slots = self.slots.lock();
        slots
            .entry(id.to_path_buf())
            .or_insert_with(|| {
                trace!("Creating lock for {}", id.display());
                Arc::new(Slot {
                    rw: Arc::new(RwLock::new(())),
                    deploy: Arc::new(AsyncMutex::new(())),
                })
            })
            .clone()
    }

    /// Number of identities seen so far
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared access; any number of readers, never alongside a writer
    pub async fn acquire_read(&self, id: &Path) -> ReadGuard {
        let rw = self.slot(id).rw.clone();
        let inner = rw.read_owned().await;
        self.notify_acquired(id, LockMode::Shared);
        ReadGuard {
            id: id.to_path_buf(),
            inner: Some(inner),
            observer: self.observer.clone(),
        }
    }

    /// Exclusive access
    pub async fn acquire_write(&self, id: &Path) -> WriteGuard {
        let rw = self.slot(id).rw.clone();
        let inner = rw.write_owned().await;
        self.notify_acquired(id, LockMode::Exclusive);
        WriteGuard {
            id: id.to_path_buf(),
            inner: Some(inner),
            observer: self.observer.clone(),
        }
    }

    /// The single deploy slot for a cache identity
    pub async fn acquire_deploy(&self, id: &Path) -> DeployGuard {
        let deploy = self.slot(id).deploy.clone();
        DeployGuard {
            _inner: deploy.lock_owned().await,
        }
    }

    fn notify_acquired(&self, id: &Path, mode: LockMode) {
        trace!("Acquired {} lock on {}", mode, id.display());
        if let Some(observer) = &self.observer {
            observer.acquired(id, mode);
        }
    }
}

/// Shared hold on a cache
pub struct ReadGuard {
    id: PathBuf,
    inner: Option<OwnedRwLockReadGuard<()>>,
    observer: Option<Arc<dyn LockObserver>>,
}

impl ReadGuard {
    pub fn id(&self) -> &Path {
        &self.id
    }
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        if self.inner.is_some() {
            trace!("Releasing shared lock on {}", self.id.display());
            if let Some(observer) = &self.observer {
                observer.released(&self.id, LockMode::Shared);
            }
        }
    }
}

/// Exclusive hold on a cache
pub struct WriteGuard {
    id: PathBuf,
    inner: Option<OwnedRwLockWriteGuard<()>>,
    observer: Option<Arc<dyn LockObserver>>,
}

impl WriteGuard {
    pub fn id(&self) -> &Path {
        &self.id
    }

    /// Atomically trade exclusive access for shared access
    pub fn downgrade(mut self) -> ReadGuard {
        if let Some(observer) = &self.observer {
            observer.released(&self.id, LockMode::Exclusive);
        }
        let inner = self.inner.take().map(OwnedRwLockWriteGuard::downgrade);
        if let Some(observer) = &self.observer {
            observer.acquired(&self.id, LockMode::Shared);
        }
        ReadGuard {
            id: self.id.clone(),
            inner,
            observer: self.observer.clone(),
        }
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if self.inner.is_some() {
            trace!("Releasing exclusive lock on {}", self.id.display());
            if let Some(observer) = &self.observer {
                observer.released(&self.id, LockMode::Exclusive);
            }
        }
    }
}

/// Held for the whole of one deploy transaction
pub struct DeployGuard {
    _inner: OwnedMutexGuard<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordingObserver;
    use std::time::Duration;

    #[tokio::test]
    async fn lazily_creates_one_lock_per_identity() {
        let registry = LockRegistry::new();
        assert!(registry.is_empty());

        drop(registry.acquire_read(Path::new("/a")).await);
        drop(registry.acquire_write(Path::new("/a")).await);
        drop(registry.acquire_read(Path::new("/b")).await);

        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn readers_share() {
        let registry = LockRegistry::new();
        let r1 = registry.acquire_read(Path::new("/c")).await;
        let r2 = tokio::time::timeout(
            Duration::from_millis(200),
            registry.acquire_read(Path::new("/c")),
        )
        .await;
        assert!(r2.is_ok());
        drop(r1);
    }

    #[tokio::test]
    async fn writer_waits_for_reader() {
        let registry = LockRegistry::new();
        let reader = registry.acquire_read(Path::new("/c")).await;
        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            registry.acquire_write(Path::new("/c")),
        )
        .await;
        assert!(blocked.is_err());

        drop(reader);
        let writer = tokio::time::timeout(
            Duration::from_millis(500),
            registry.acquire_write(Path::new("/c")),
        )
        .await;
        assert!(writer.is_ok());
    }

    #[tokio::test]
    async fn distinct_identities_do_not_contend() {
        let registry = LockRegistry::new();
        let _w = registry.acquire_write(Path::new("/one")).await;
        let other = tokio::time::timeout(
            Duration::from_millis(200),
            registry.acquire_write(Path::new("/two")),
        )
        .await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn downgrade_admits_readers_but_not_writers() {
        let registry = LockRegistry::new();
        let id = Path::new("/d");
        let read = registry.acquire_write(id).await.downgrade();

        let reader = tokio::time::timeout(Duration::from_millis(200), registry.acquire_read(id)).await;
        assert!(reader.is_ok());
        drop(reader);

        let writer =
            tokio::time::timeout(Duration::from_millis(100), registry.acquire_write(id)).await;
        assert!(writer.is_err());
        drop(read);
    }

    #[tokio::test]
    async fn deploy_slot_is_exclusive() {
        let registry = LockRegistry::new();
        let id = Path::new("/e");
        let first = registry.acquire_deploy(id).await;
        let second =
            tokio::time::timeout(Duration::from_millis(100), registry.acquire_deploy(id)).await;
        assert!(second.is_err());
        drop(first);
        assert!(
            tokio::time::timeout(Duration::from_millis(200), registry.acquire_deploy(id))
                .await
                .is_ok()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn writer_hold_intervals_never_overlap() {
        let observer = Arc::new(RecordingObserver::default());
        let registry = Arc::new(LockRegistry::with_observer(observer.clone()));
        let id = PathBuf::from("/cache");

        let mut tasks = Vec::new();
        for i in 0..24 {
            let registry = registry.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                match i % 4 {
                    0 => {
                        let _w = registry.acquire_write(&id).await;
                        tokio::time::sleep(Duration::from_millis(3)).await;
                    }
                    1 => {
                        let w = registry.acquire_write(&id).await;
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        let _r = w.downgrade();
                        tokio::time::sleep(Duration::from_millis(2)).await;
                    }
                    _ => {
                        let _r = registry.acquire_read(&id).await;
                        tokio::time::sleep(Duration::from_millis(2)).await;
                    }
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(observer.violations(), 0);
        assert!(observer.max_readers() >= 1);
        assert_eq!(observer.active(), (0, 0));
    }
}
