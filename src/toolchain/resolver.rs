//! Dependency resolver adapter (`go get` in GOPATH mode)

use crate::config::schema::TimeoutsConfig;
use crate::environment::ActivityLog;
use crate::error::BuildwrightResult;
use crate::toolchain::{run, CommandSpec, GoPath};
use async_trait::async_trait;

/// Materializes a module and its declared dependencies into a GOPATH
#[async_trait]
pub trait DependencyResolver: Send + Sync {
    /// Add whatever is missing; never touches existing checkouts.
    /// `whole_tree` also resolves every package below the module.
    async fn ensure_present(
        &self,
        gopath: &GoPath,
        module: &str,
        whole_tree: bool,
        log: &ActivityLog,
    ) -> BuildwrightResult<()>;

    /// Move the module and its dependencies to the latest upstream revision
    async fn update(
        &self,
        gopath: &GoPath,
        module: &str,
        whole_tree: bool,
        log: &ActivityLog,
    ) -> BuildwrightResult<()>;
}

/// `go get -d -t -x` implementation
pub struct GoGet {
    program: String,
    timeouts: TimeoutsConfig,
}

impl GoGet {
    pub fn new(program: &str, timeouts: TimeoutsConfig) -> Self {
        Self {
            program: program.to_string(),
            timeouts,
        }
    }

    fn command(&self, gopath: &GoPath, update: bool, target: String) -> BuildwrightResult<CommandSpec> {
        let mut spec = CommandSpec::new(&self.program, self.timeouts.resolve()).arg("get");
        if update {
            spec = spec.arg("-u");
        }
        spec.args(["-d", "-t", "-x"]).arg(target).gopath(gopath)
    }
}

fn target(module: &str, whole_tree: bool) -> String {
    if whole_tree {
        format!("{module}/...")
    } else {
        module.to_string()
    }
}

#[async_trait]
impl DependencyResolver for GoGet {
    async fn ensure_present(
        &self,
        gopath: &GoPath,
        module: &str,
        whole_tree: bool,
        log: &ActivityLog,
    ) -> BuildwrightResult<()> {
        let spec = self.command(gopath, false, target(module, whole_tree))?;
        run(&spec, log).await?;
        Ok(())
    }

    async fn update(
        &self,
        gopath: &GoPath,
        module: &str,
        whole_tree: bool,
        log: &ActivityLog,
    ) -> BuildwrightResult<()> {
        let spec = self.command(gopath, true, target(module, whole_tree))?;
        run(&spec, log).await?;
        Ok(())
    }
}
