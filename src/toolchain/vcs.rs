//! Version control adapter (git CLI)

use crate::config::schema::TimeoutsConfig;
use crate::environment::{ActivityLog, Revision};
use crate::error::BuildwrightResult;
use crate::toolchain::{run, CommandSpec};
use async_trait::async_trait;
use std::path::Path;

/// State of a checkout's HEAD, as embedded into built binaries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadDescription {
    /// Tag HEAD sits on exactly, if any
    pub exact_tag: Option<String>,
    /// Nearest ancestor tag, if any
    pub nearest_tag: Option<String>,
    /// Short revision hash
    pub commit: String,
    /// Summary of uncommitted changes
    pub short_stat: String,
    /// Uncommitted files, one per line
    pub files_modified: String,
}

/// Narrow interface over the version control tool
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Make every upstream revision reachable in `repo`
    async fn fetch(&self, repo: &Path, log: &ActivityLog) -> BuildwrightResult<()>;

    /// Check out `revision` in `repo`
    async fn checkout(
        &self,
        repo: &Path,
        revision: &Revision,
        log: &ActivityLog,
    ) -> BuildwrightResult<()>;

    /// Describe HEAD of `repo`
    async fn describe_head(&self, repo: &Path, log: &ActivityLog)
        -> BuildwrightResult<HeadDescription>;
}

/// `git` command-line implementation
pub struct Git {
    program: String,
    timeouts: TimeoutsConfig,
}

impl Git {
    pub fn new(program: &str, timeouts: TimeoutsConfig) -> Self {
        Self {
            program: program.to_string(),
            timeouts,
        }
    }

    fn command(&self, repo: &Path) -> CommandSpec {
        CommandSpec::new(&self.program, self.timeouts.vcs()).dir(repo)
    }
}

#[async_trait]
impl VersionControl for Git {
    async fn fetch(&self, repo: &Path, log: &ActivityLog) -> BuildwrightResult<()> {
        run(&self.command(repo).arg("fetch"), log).await?;
        Ok(())
    }

    async fn checkout(
        &self,
        repo: &Path,
        revision: &Revision,
        log: &ActivityLog,
    ) -> BuildwrightResult<()> {
        let spec = self.command(repo).args(["checkout", revision.checkout_arg()]);
        run(&spec, log).await?;
        Ok(())
    }

    async fn describe_head(
        &self,
        repo: &Path,
        log: &ActivityLog,
    ) -> BuildwrightResult<HeadDescription> {
        // Not being on a tag, or having no tags at all, is normal
        let exact_tag = run(
            &self.command(repo).args(["describe", "--exact-match", "HEAD"]),
            log,
        )
        .await
        .ok()
        .filter(|t| !t.is_empty());
        let nearest_tag = run(
            &self
                .command(repo)
                .args(["describe", "--abbrev=0", "--tags", "HEAD"]),
            log,
        )
        .await
        .ok()
        .filter(|t| !t.is_empty());

        let commit = run(
            &self.command(repo).args(["rev-parse", "--short", "HEAD"]),
            log,
        )
        .await?;
        let short_stat = run(
            &self.command(repo).args(["diff-index", "--shortstat", "HEAD"]),
            log,
        )
        .await?;
        let files_modified = run(
            &self.command(repo).args(["diff-index", "--name-only", "HEAD"]),
            log,
        )
        .await?;

        Ok(HeadDescription {
            exact_tag,
            nearest_tag,
            commit,
            short_stat,
            files_modified,
        })
    }
}
