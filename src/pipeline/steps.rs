//! Steps that need more than one toolchain call

use crate::error::{BuildwrightError, BuildwrightResult};
use crate::inject::{inject, InjectOutcome};
use crate::pipeline::CheckContext;
use futures_util::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Puts a file's original bytes back when dropped
struct RestoreOnDrop {
    path: PathBuf,
    original: Vec<u8>,
}

impl RestoreOnDrop {
    fn capture(path: &Path) -> BuildwrightResult<Self> {
        let original = std::fs::read(path)
            .map_err(|e| BuildwrightError::io(format!("reading {}", path.display()), e))?;
        Ok(Self {
            path: path.to_path_buf(),
            original,
        })
    }
}

impl Drop for RestoreOnDrop {
    fn drop(&mut self) {
        if let Err(e) = std::fs::write(&self.path, &self.original) {
            warn!("Failed to restore {}: {}", self.path.display(), e);
        }
    }
}

/// Inject `module` and the rest of the roster into the host entry file,
/// run the host's test suite, then put the entry file back.
pub(super) async fn host_compatibility(module: &str, cx: &CheckContext<'_>) -> BuildwrightResult<()> {
    let env = cx.env;
    let log = env.log();
    let host_dir = env.host_path();
    let entry = host_dir.join(cx.entry_file);
    let _restore = RestoreOnDrop::capture(&entry)?;

    let mut roster = vec![module.to_string()];
    roster.extend(
        env.extensions()
            .into_iter()
            .map(|m| m.identifier)
            .filter(|id| id != module),
    );
    for id in &roster {
        match inject(&entry, id)? {
            InjectOutcome::Inserted => log.record(format!("Plugged {} into {}", id, entry.display())),
            InjectOutcome::AlreadyPresent => log.record(format!("{} already plugged in", id)),
        }
    }

    cx.compiler.test(&env.gopath(), &host_dir, log).await
}

/// Compile `module` for every platform, `cx.parallel` at a time.
/// Failures are reported in catalog order.
pub(super) async fn compile_matrix(module: &str, cx: &CheckContext<'_>) -> BuildwrightResult<()> {
    if cx.platforms.is_empty() {
        return Err(BuildwrightError::EmptyCatalog);
    }

    let gopath = cx.env.gopath();
    let gopath = &gopath;
    let log = cx.env.log();
    let compiler = cx.compiler;
    let checks: Vec<_> = cx
        .platforms
        .iter()
        .map(move |platform| async move {
            let result = compiler.compile_check(gopath, module, platform, log).await;
            (platform, result)
        })
        .collect();
    let results: Vec<_> = stream::iter(checks)
        .buffered(cx.parallel.max(1))
        .collect()
        .await;

    let failures: Vec<String> = results
        .into_iter()
        .filter_map(|(platform, result)| result.err().map(|e| format!("{platform}: {e}")))
        .collect();
    if failures.is_empty() {
        log.record(format!("{} compiles for {} platforms", module, cx.platforms.len()));
        Ok(())
    } else {
        Err(BuildwrightError::CompileMatrix {
            total: cx.platforms.len(),
            failures,
        })
    }
}
