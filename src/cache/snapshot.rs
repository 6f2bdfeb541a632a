//! Point-in-time copies of the whole cache for deploy rollback

use crate::cache::copy::{deep_copy_async, remove_tree, CopyOptions};
use crate::cache::{PackageCache, WriteGuard};
use crate::error::{BuildwrightError, BuildwrightResult};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use uuid::Uuid;

/// A cache backup on disk
#[derive(Debug)]
pub struct Snapshot {
    path: PathBuf,
}

impl Snapshot {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the backup
    pub async fn discard(self) -> BuildwrightResult<()> {
        remove_tree(self.path.clone()).await.map_err(|e| {
            BuildwrightError::io(format!("removing backup {}", self.path.display()), e)
        })
    }
}

impl PackageCache {
    /// Copy the entire cache into a new directory under `backup_dir`.
    ///
    /// Taken under the exclusive lock so no writer can interleave.
    pub async fn snapshot(&self, guard: &WriteGuard, backup_dir: &Path) -> BuildwrightResult<Snapshot> {
        self.check_guard(guard.id())?;
        let path = backup_dir.join(format!("cache_backup_{}", Uuid::new_v4().simple()));

        match deep_copy_async(self.root.clone(), path.clone(), CopyOptions::snapshot()).await {
            Ok(files) => {
                info!("Backed up {} files of {} to {}", files, self.root.display(), path.display());
                Ok(Snapshot { path })
            }
            Err(e) => {
                let _ = remove_tree(path.clone()).await;
                Err(BuildwrightError::io(
                    format!("backing up {} to {}", self.root.display(), path.display()),
                    e,
                ))
            }
        }
    }

    /// Replace the live cache with the contents of `snapshot`.
    ///
    /// The live tree is renamed aside first and deleted only after the copy
    /// succeeds. Any failure here is unrecoverable and is not retried; the
    /// snapshot is left on disk.
    pub async fn restore(&self, guard: &WriteGuard, snapshot: &Snapshot) -> BuildwrightResult<()> {
        self.check_guard(guard.id())?;
        let suffix = Uuid::new_v4().simple().to_string();
        // Sibling of the cache, never inside it
        let mut name = self.root.file_name().map(OsStr::to_os_string).unwrap_or_default();
        name.push(format!("_tmp_{}", &suffix[..8]));
        let aside = self.root.with_file_name(name);

        let fail = |reason: String| {
            error!(
                cache = %self.root.display(),
                backup = %snapshot.path.display(),
                "Cache restore failed: {}",
                reason
            );
            BuildwrightError::Rollback {
                cache: self.root.clone(),
                backup: snapshot.path.clone(),
                reason,
            }
        };

        tokio::fs::rename(&self.root, &aside)
            .await
            .map_err(|e| fail(format!("moving live cache aside to {}: {e}", aside.display())))?;

        deep_copy_async(snapshot.path.clone(), self.root.clone(), CopyOptions::snapshot())
            .await
            .map_err(|e| {
                fail(format!(
                    "copying backup into place: {e} (previous live cache kept at {})",
                    aside.display()
                ))
            })?;

        remove_tree(aside.clone())
            .await
            .map_err(|e| fail(format!("removing old live cache {}: {e}", aside.display())))?;

        info!("Restored {} from {}", self.root.display(), snapshot.path.display());
        Ok(())
    }
}
