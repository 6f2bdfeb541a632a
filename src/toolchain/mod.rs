//! External tool adapters
//!
//! Every subprocess the worker starts goes through [`run`], which attaches a
//! deadline, records the command in the environment's activity log and
//! captures output for error reporting.
//!
//! - [`VersionControl`]: fetch, checkout and HEAD description (git)
//! - [`DependencyResolver`]: materialize or update dependencies (go get)
//! - [`Compiler`]: vet, test, cross-compile, platform listing (go)

mod compiler;
mod resolver;
mod vcs;

pub use compiler::{BinaryBuild, Compiler, GoToolchain};
pub use resolver::{DependencyResolver, GoGet};
pub use vcs::{Git, HeadDescription, VersionControl};

use crate::config::Config;
use crate::environment::ActivityLog;
use crate::error::{BuildwrightError, BuildwrightResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Max number of output lines to include in command error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Variables inherited from the worker's own environment; everything else is cleared.
const PASSTHROUGH_ENV: [&str; 3] = ["PATH", "HOME", "TMPDIR"];

/// Extract the useful tail of command output for error diagnostics.
///
/// Combines stdout and stderr, then returns the last `ERROR_TAIL_LINES`
/// lines so error messages are actionable without being overwhelming.
pub(crate) fn error_output(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let total = lines.len();
    let tail: Vec<&str> = if total > ERROR_TAIL_LINES {
        lines[total - ERROR_TAIL_LINES..].to_vec()
    } else {
        lines
    };
    tail.join("\n")
}

/// Ordered list of source roots handed to the toolchain as `GOPATH`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoPath(Vec<PathBuf>);

impl GoPath {
    /// Only the shared package cache
    pub fn cache_only(cache_root: &Path) -> Self {
        Self(vec![cache_root.to_path_buf()])
    }

    /// Workspace first, falling back to the package cache
    pub fn layered(workspace: &Path, cache_root: &Path) -> Self {
        Self(vec![workspace.to_path_buf(), cache_root.to_path_buf()])
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.0
    }

    /// Value for the `GOPATH` variable
    pub fn to_env(&self) -> BuildwrightResult<OsString> {
        std::env::join_paths(&self.0)
            .map_err(|e| BuildwrightError::Internal(format!("joining GOPATH entries: {e}")))
    }
}

/// A fully described external command
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
    env: Vec<(String, OsString)>,
    timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            env: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set `GOPATH` and force GOPATH-mode resolution
    pub fn gopath(self, gopath: &GoPath) -> BuildwrightResult<Self> {
        Ok(self
            .env("GOPATH", gopath.to_env()?)
            .env("GO111MODULE", "off"))
    }

    /// Command line as shown in logs and errors
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Run a command to completion within its deadline.
///
/// Returns trimmed stdout on success. On a non-zero exit the tail of the
/// combined output is recorded in `log` and carried in the error. On timeout
/// the child is killed.
pub async fn run(spec: &CommandSpec, log: &ActivityLog) -> BuildwrightResult<String> {
    let display = spec.display();
    let dir = spec
        .dir
        .as_deref()
        .map(|d| d.display().to_string())
        .unwrap_or_default();
    log.record(format!("exec [{}] {}", dir, display));

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .env_clear()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for key in PASSTHROUGH_ENV {
        if let Some(value) = std::env::var_os(key) {
            cmd.env(key, value);
        }
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    if let Some(dir) = &spec.dir {
        cmd.current_dir(dir);
    }

    let output = match tokio::time::timeout(spec.timeout, cmd.output()).await {
        Ok(result) => result.map_err(|e| BuildwrightError::command_failed(display.clone(), e))?,
        Err(_) => {
            log.record(format!(
                "timed out after {}s: {}",
                spec.timeout.as_secs(),
                display
            ));
            return Err(BuildwrightError::CommandTimeout {
                command: display,
                timeout: spec.timeout,
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    if output.status.success() {
        let command = &display;
        debug!("{} succeeded", command);
        return Ok(stdout.trim().to_string());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let tail = error_output(&stdout, &stderr);
    log.record(format!("failed ({}): {}\n{}", output.status, display, tail));
    Err(BuildwrightError::command_exec(display, tail))
}

/// The external collaborators one worker talks to
#[derive(Clone)]
pub struct Tools {
    pub vcs: Arc<dyn VersionControl>,
    pub resolver: Arc<dyn DependencyResolver>,
    pub compiler: Arc<dyn Compiler>,
}

impl Tools {
    /// git + go from the configured executables
    pub fn system(config: &Config) -> Self {
        Self {
            vcs: Arc::new(Git::new(&config.tools.git, config.timeouts.clone())),
            resolver: Arc::new(GoGet::new(&config.tools.go, config.timeouts.clone())),
            compiler: Arc::new(GoToolchain::new(
                &config.tools.go,
                config.timeouts.clone(),
                config.checks.parallel_builds,
            )),
        }
    }
}
