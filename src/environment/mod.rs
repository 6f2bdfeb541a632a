//! Per-request build environments
//!
//! A [`BuildEnvironment`] owns one ephemeral workspace, refers to the shared
//! [`PackageCache`] and records which version of each module the request
//! wants. The workspace directory is removed when the environment is dropped,
//! whichever way the request ends.

mod log;
mod module;
mod provision;

pub use log::{ActivityLog, LogEntry};
pub use module::{validate_identifier, ModuleRef, Revision, PREVIOUS};
pub use provision::Provisioner;

use crate::cache::{PackageCache, SOURCE_DIR};
use crate::error::{BuildwrightError, BuildwrightResult};
use crate::toolchain::GoPath;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Workspace directory name prefix; the timestamp makes leftovers easy to date
const WORKSPACE_PREFIX: &str = "gopath_";

/// One request's workspace plus the module versions it should hold
pub struct BuildEnvironment {
    workspace: TempDir,
    cache: PackageCache,
    host: String,
    modules: BTreeMap<String, String>,
    log: ActivityLog,
}

impl BuildEnvironment {
    /// Create an empty workspace for `host` at `host_version` plus `extensions`.
    ///
    /// Fails if any identifier is unsafe or appears twice.
    pub fn new(
        cache: PackageCache,
        host: &ModuleRef,
        extensions: &[ModuleRef],
        workspace_dir: Option<&Path>,
    ) -> BuildwrightResult<Self> {
        let mut modules = BTreeMap::new();
        for module in std::iter::once(host).chain(extensions) {
            validate_identifier(&module.identifier)?;
            if module.version.is_empty() {
                return Err(BuildwrightError::InvalidModule {
                    identifier: module.identifier.clone(),
                    reason: "version must not be empty".to_string(),
                });
            }
            if modules
                .insert(module.identifier.clone(), module.version.clone())
                .is_some()
            {
                return Err(BuildwrightError::InvalidModule {
                    identifier: module.identifier.clone(),
                    reason: "listed more than once".to_string(),
                });
            }
        }

        let prefix = format!("{}{}.", WORKSPACE_PREFIX, chrono::Local::now().format("%m%d-%H%M"));
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let workspace = match workspace_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
        .map_err(|e| BuildwrightError::io("creating workspace", e))?;

        let log = ActivityLog::new();
        log.record(format!(
            "Opened environment {} over cache {}",
            workspace.path().display(),
            cache.root().display()
        ));

        Ok(Self {
            workspace,
            cache,
            host: host.identifier.clone(),
            modules,
            log,
        })
    }

    pub fn workspace(&self) -> &Path {
        self.workspace.path()
    }

    pub fn cache(&self) -> &PackageCache {
        &self.cache
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    /// Identifier of the host module
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Checkout of `identifier` inside the workspace
    pub fn module_path(&self, identifier: &str) -> PathBuf {
        self.workspace.path().join(SOURCE_DIR).join(identifier)
    }

    pub fn host_path(&self) -> PathBuf {
        self.module_path(&self.host)
    }

    /// Requested version of `identifier`, if it is part of this environment
    pub fn version_of(&self, identifier: &str) -> Option<&str> {
        self.modules.get(identifier).map(String::as_str)
    }

    /// Every module, host first
    pub fn modules(&self) -> Vec<ModuleRef> {
        let mut all = vec![ModuleRef::new(&self.host, &self.modules[&self.host])];
        all.extend(self.extensions());
        all
    }

    /// Every module except the host, in identifier order
    pub fn extensions(&self) -> Vec<ModuleRef> {
        self.modules
            .iter()
            .filter(|(id, _)| **id != self.host)
            .map(|(id, version)| ModuleRef::new(id, version))
            .collect()
    }

    /// Workspace first, then the cache
    pub fn gopath(&self) -> GoPath {
        GoPath::layered(self.workspace.path(), self.cache.root())
    }

    /// Delete the workspace now rather than on drop, reporting failure
    pub fn close(self) -> BuildwrightResult<()> {
        let path = self.workspace.path().to_path_buf();
        debug!("Removing workspace {}", path.display());
        self.workspace.close().map_err(|e| {
            warn!("Failed to remove workspace {}: {}", path.display(), e);
            BuildwrightError::io(format!("removing workspace {}", path.display()), e)
        })
    }
}
