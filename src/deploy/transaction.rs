//! Deploy transaction state machine
//!
//! ```text
//! Idle -> BackingUp -> Updating -> Validating -> Committed   -> Idle
//!             |           |            |
//!             v           +------------+-----> RollingBack -> RolledBack -> Idle
//!           Idle (backup failed, nothing changed)
//! ```

use crate::cache::{Snapshot, WriteGuard};
use crate::environment::BuildEnvironment;
use crate::error::{BuildwrightError, BuildwrightResult};
use crate::pipeline::PipelineReport;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    Idle,
    BackingUp,
    Updating,
    Validating,
    Committed,
    RollingBack,
    RolledBack,
}

impl DeployState {
    fn can_advance_to(self, next: DeployState) -> bool {
        use DeployState::*;
        matches!(
            (self, next),
            (Idle, BackingUp)
                | (BackingUp, Updating)
                | (BackingUp, Idle)
                | (Updating, Validating)
                | (Updating, RollingBack)
                | (Validating, Committed)
                | (Validating, RollingBack)
                | (RollingBack, RolledBack)
                | (Committed, Idle)
                | (RolledBack, Idle)
        )
    }

    /// Committed or rolled back
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::BackingUp => "backing up",
            Self::Updating => "updating",
            Self::Validating => "validating",
            Self::Committed => "committed",
            Self::RollingBack => "rolling back",
            Self::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// One deploy: an environment, a cache backup and a decision
pub struct DeployTransaction<'e> {
    env: &'e BuildEnvironment,
    state: DeployState,
    history: Vec<DeployState>,
    snapshot: Option<Snapshot>,
    report: Option<PipelineReport>,
}

impl<'e> DeployTransaction<'e> {
    pub fn begin(env: &'e BuildEnvironment) -> Self {
        Self {
            env,
            state: DeployState::Idle,
            history: vec![DeployState::Idle],
            snapshot: None,
            report: None,
        }
    }

    pub fn env(&self) -> &'e BuildEnvironment {
        self.env
    }

    pub fn state(&self) -> DeployState {
        self.state
    }

    /// Every state entered so far, in order
    pub fn history(&self) -> &[DeployState] {
        &self.history
    }

    /// Where the cache backup lives while the transaction is open
    pub fn backup_path(&self) -> Option<&Path> {
        self.snapshot.as_ref().map(Snapshot::path)
    }

    /// Outcome of validation, once it has run
    pub fn report(&self) -> Option<&PipelineReport> {
        self.report.as_ref()
    }

    pub(crate) fn record_report(&mut self, report: PipelineReport) {
        self.report = Some(report);
    }

    pub(crate) fn take_report(&mut self) -> Option<PipelineReport> {
        self.report.take()
    }

    pub(crate) fn advance(&mut self, next: DeployState) -> BuildwrightResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(BuildwrightError::Internal(format!(
                "deploy cannot go from {} to {}",
                self.state, next
            )));
        }
        self.env
            .log()
            .record(format!("Deploy: {} -> {}", self.state, next));
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Snapshot the cache. The caller holds the exclusive lock through the
    /// following update.
    pub(crate) async fn back_up(&mut self, guard: &WriteGuard, backup_dir: &Path) -> BuildwrightResult<()> {
        self.advance(DeployState::BackingUp)?;
        match self.env.cache().snapshot(guard, backup_dir).await {
            Ok(snapshot) => {
                self.env
                    .log()
                    .record(format!("Backed up cache to {}", snapshot.path().display()));
                self.snapshot = Some(snapshot);
                Ok(())
            }
            Err(e) => {
                self.advance(DeployState::Idle)?;
                Err(e)
            }
        }
    }

    /// Keep the updated cache and delete the backup
    pub(crate) async fn commit(&mut self) -> BuildwrightResult<()> {
        self.advance(DeployState::Committed)?;
        if let Some(snapshot) = self.snapshot.take() {
            if let Err(e) = snapshot.discard().await {
                // The cache is already in its final state
                warn!("Deploy committed but the backup could not be removed: {}", e);
            }
        }
        Ok(())
    }

    /// Put the backup back in place of the live cache, then delete it.
    ///
    /// On failure the backup is kept on disk and the transaction stays in
    /// `RollingBack`. There is no retry.
    pub(crate) async fn roll_back(&mut self, guard: &WriteGuard) -> BuildwrightResult<()> {
        self.advance(DeployState::RollingBack)?;
        let cache = self.env.cache();
        let snapshot = self.snapshot.as_ref().ok_or_else(|| {
            BuildwrightError::Internal("rolling back without a backup".to_string())
        })?;

        if let Err(e) = cache.restore(guard, snapshot).await {
            error!(
                backup = %snapshot.path().display(),
                "Deploy rollback failed; backup kept for manual recovery"
            );
            self.env.log().record(format!("Rollback failed: {}", e));
            return Err(e);
        }

        if let Some(snapshot) = self.snapshot.take() {
            if let Err(e) = snapshot.discard().await {
                warn!("Cache restored but the backup could not be removed: {}", e);
            }
        }
        self.advance(DeployState::RolledBack)
    }

    /// Return to `Idle` after resolution
    pub(crate) fn finish(&mut self) -> BuildwrightResult<()> {
        self.advance(DeployState::Idle)
    }
}

impl Drop for DeployTransaction<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = &self.snapshot {
            if !matches!(self.state, DeployState::RollingBack) {
                warn!(
                    "Deploy abandoned in state {}; backup left at {}",
                    self.state,
                    snapshot.path().display()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LockRegistry, PackageCache};
    use crate::environment::ModuleRef;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn legal_transitions() {
        use DeployState::*;
        assert!(Idle.can_advance_to(BackingUp));
        assert!(Validating.can_advance_to(RollingBack));
        assert!(!Idle.can_advance_to(Committed));
        assert!(!Committed.can_advance_to(RollingBack));
        assert!(!RolledBack.can_advance_to(Committed));
        assert!(Committed.is_resolved() && RolledBack.is_resolved());
        assert!(!RollingBack.is_resolved());
    }

    #[test]
    fn illegal_transition_is_an_internal_error() {
        let dir = TempDir::new().unwrap();
        let cache = PackageCache::open(dir.path().join("cache"), Arc::new(LockRegistry::new())).unwrap();
        let env = BuildEnvironment::new(
            cache,
            &ModuleRef::new("github.com/mholt/caddy", "master"),
            &[],
            Some(dir.path()),
        )
        .unwrap();
        let mut tx = DeployTransaction::begin(&env);

        let err = tx.advance(DeployState::Committed).unwrap_err();
        assert!(matches!(err, BuildwrightError::Internal(_)));
        assert_eq!(tx.state(), DeployState::Idle);
        assert_eq!(tx.history(), [DeployState::Idle]);
    }
}
