//! Shared package cache
//!
//! A GOPATH-shaped directory holding one version-controlled checkout per
//! module identifier at `<root>/src/<identifier>`. It is shared by every
//! request and only ever touched under a lock from the [`LockRegistry`].
//!
//! # Access Model
//!
//! | Operation | Lock | Who |
//! |-----------|------|-----|
//! | Fill in missing modules | exclusive | provisioning, step 1 |
//! | Copy a module out | shared | provisioning, steps 2-5 |
//! | Snapshot + update | exclusive | deploy |
//! | Validate | shared | deploy |
//! | Restore | exclusive | deploy rollback |
//!
//! Ordinary builds never mutate existing checkouts.

pub mod copy;
pub mod locks;
mod snapshot;

pub use copy::{deep_copy, CopyOptions};
pub use locks::{DeployGuard, LockMode, LockObserver, LockRegistry, ReadGuard, WriteGuard};
pub use snapshot::Snapshot;

use crate::environment::ActivityLog;
use crate::error::{BuildwrightError, BuildwrightResult};
use crate::toolchain::{DependencyResolver, GoPath};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Subdirectory holding module sources
pub const SOURCE_DIR: &str = "src";

/// Handle on the shared package cache
#[derive(Clone)]
pub struct PackageCache {
    root: PathBuf,
    identity: PathBuf,
    locks: Arc<LockRegistry>,
}

impl PackageCache {
    /// Open (creating if needed) the cache rooted at `root`.
    ///
    /// A trailing separator is dropped, so `root` always names the cache
    /// directory itself and siblings can be derived from it.
    pub fn open(root: impl Into<PathBuf>, locks: Arc<LockRegistry>) -> BuildwrightResult<Self> {
        let root: PathBuf = root.into().components().collect();
        std::fs::create_dir_all(root.join(SOURCE_DIR)).map_err(|e| {
            BuildwrightError::io(format!("creating package cache {}", root.display()), e)
        })?;
        let identity = root.canonicalize().unwrap_or_else(|_| root.clone());
        debug!("Package cache {} (identity {})", root.display(), identity.display());
        Ok(Self {
            root,
            identity,
            locks,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Key under which this cache's locks are registered
    pub fn identity(&self) -> &Path {
        &self.identity
    }

    /// Checkout of `identifier` inside the cache
    pub fn module_path(&self, identifier: &str) -> PathBuf {
        self.root.join(SOURCE_DIR).join(identifier)
    }

    /// GOPATH that resolves against the cache only
    pub fn gopath(&self) -> GoPath {
        GoPath::cache_only(&self.root)
    }

    pub async fn read(&self) -> ReadGuard {
        self.locks.acquire_read(&self.identity).await
    }

    pub async fn write(&self) -> WriteGuard {
        self.locks.acquire_write(&self.identity).await
    }

    pub async fn deploy_slot(&self) -> DeployGuard {
        self.locks.acquire_deploy(&self.identity).await
    }

    /// Add `module` (and for `whole_tree`, everything below it) if missing
    pub async fn ensure_present(
        &self,
        guard: &WriteGuard,
        resolver: &dyn DependencyResolver,
        module: &str,
        whole_tree: bool,
        log: &ActivityLog,
    ) -> BuildwrightResult<()> {
        self.check_guard(guard.id())?;
        resolver
            .ensure_present(&self.gopath(), module, whole_tree, log)
            .await
    }

    /// Move `module` to its latest upstream revision
    pub async fn update(
        &self,
        guard: &WriteGuard,
        resolver: &dyn DependencyResolver,
        module: &str,
        whole_tree: bool,
        log: &ActivityLog,
    ) -> BuildwrightResult<()> {
        self.check_guard(guard.id())?;
        log.record(format!("Updating package cache {}: {}", self.root.display(), module));
        resolver.update(&self.gopath(), module, whole_tree, log).await
    }

    fn check_guard(&self, held: &Path) -> BuildwrightResult<()> {
        if held == self.identity {
            Ok(())
        } else {
            Err(BuildwrightError::Internal(format!(
                "lock for {} used on cache {}",
                held.display(),
                self.identity.display()
            )))
        }
    }
}
