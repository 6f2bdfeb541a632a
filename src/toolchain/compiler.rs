//! Compiler adapter (the `go` tool)

use crate::config::schema::TimeoutsConfig;
use crate::environment::ActivityLog;
use crate::error::BuildwrightResult;
use crate::platform::Platform;
use crate::toolchain::{run, CommandSpec, GoPath};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Inputs for linking one host binary
#[derive(Debug, Clone)]
pub struct BinaryBuild {
    pub gopath: GoPath,
    /// Directory of the main package
    pub dir: PathBuf,
    pub platform: Platform,
    /// Linker flags carrying version metadata
    pub ldflags: String,
    pub output: PathBuf,
}

/// Static analysis, tests and compilation
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Static analysis of every package below `dir`
    async fn vet(&self, gopath: &GoPath, dir: &Path, log: &ActivityLog) -> BuildwrightResult<()>;

    /// Test every package below `dir` with the race detector enabled
    async fn test(&self, gopath: &GoPath, dir: &Path, log: &ActivityLog) -> BuildwrightResult<()>;

    /// Compile every package below `package` for `platform` without producing a binary
    async fn compile_check(
        &self,
        gopath: &GoPath,
        package: &str,
        platform: &Platform,
        log: &ActivityLog,
    ) -> BuildwrightResult<()>;

    /// Link a binary
    async fn build(&self, build: &BinaryBuild, log: &ActivityLog) -> BuildwrightResult<()>;

    /// Full OS x architecture matrix the toolchain knows about
    async fn list_platforms(&self) -> BuildwrightResult<Vec<Platform>>;
}

/// `go` command-line implementation
pub struct GoToolchain {
    program: String,
    timeouts: TimeoutsConfig,
    parallel_builds: usize,
}

impl GoToolchain {
    pub fn new(program: &str, timeouts: TimeoutsConfig, parallel_builds: usize) -> Self {
        Self {
            program: program.to_string(),
            timeouts,
            parallel_builds: parallel_builds.max(1),
        }
    }

    fn with_platform(spec: CommandSpec, platform: &Platform) -> CommandSpec {
        platform
            .compiler_env()
            .into_iter()
            .fold(spec, |spec, (key, value)| spec.env(key, value))
    }
}

#[async_trait]
impl Compiler for GoToolchain {
    async fn vet(&self, gopath: &GoPath, dir: &Path, log: &ActivityLog) -> BuildwrightResult<()> {
        // Relative "./..." with the checkout as cwd, so the workspace copy is
        // analysed rather than whichever GOPATH entry the tool finds first
        let spec = CommandSpec::new(&self.program, self.timeouts.test())
            .args(["vet", "./..."])
            .dir(dir)
            .gopath(gopath)?;
        run(&spec, log).await?;
        Ok(())
    }

    async fn test(&self, gopath: &GoPath, dir: &Path, log: &ActivityLog) -> BuildwrightResult<()> {
        let spec = CommandSpec::new(&self.program, self.timeouts.test())
            .args(["test", "-race", "./..."])
            .dir(dir)
            .gopath(gopath)?;
        run(&spec, log).await?;
        Ok(())
    }

    async fn compile_check(
        &self,
        gopath: &GoPath,
        package: &str,
        platform: &Platform,
        log: &ActivityLog,
    ) -> BuildwrightResult<()> {
        let spec = CommandSpec::new(&self.program, self.timeouts.build())
            .args(["build", "-p"])
            .arg(self.parallel_builds.to_string())
            .arg(format!("{package}/..."))
            .gopath(gopath)?;
        run(&Self::with_platform(spec, platform), log).await?;
        Ok(())
    }

    async fn build(&self, build: &BinaryBuild, log: &ActivityLog) -> BuildwrightResult<()> {
        let spec = CommandSpec::new(&self.program, self.timeouts.build())
            .args(["build", "-ldflags"])
            .arg(build.ldflags.clone())
            .arg("-o")
            .arg(build.output.display().to_string())
            .dir(&build.dir)
            .gopath(&build.gopath)?;
        run(&Self::with_platform(spec, &build.platform), log).await?;
        Ok(())
    }

    async fn list_platforms(&self) -> BuildwrightResult<Vec<Platform>> {
        let log = ActivityLog::new();
        let spec = CommandSpec::new(&self.program, self.timeouts.query())
            .args(["tool", "dist", "list", "-json"]);
        let out = run(&spec, &log).await?;
        Ok(serde_json::from_str(&out)?)
    }
}
