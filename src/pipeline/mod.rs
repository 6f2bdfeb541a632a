//! Check pipeline
//!
//! An explicit, ordered list of named steps run against one module's
//! checkout inside a provisioned workspace. Each step yields a typed
//! [`StepOutcome`]; whether a failure rolls a deploy back is an attribute
//! of the step, not of the caller.
//!
//! Module order: static analysis, tests, host compatibility (when the module
//! is headed for integration), then the compile matrix.

mod steps;

use crate::config::schema::ChecksConfig;
use crate::config::RunMode;
use crate::environment::BuildEnvironment;
use crate::error::{BuildwrightError, BuildwrightResult};
use crate::platform::Platform;
use crate::toolchain::Compiler;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Named pipeline steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    StaticAnalysis,
    TestSuite,
    CrossPlatformCompile,
    HostCompatibility,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StaticAnalysis => "static_analysis",
            Self::TestSuite => "test_suite",
            Self::CrossPlatformCompile => "cross_platform_compile",
            Self::HostCompatibility => "host_compatibility",
        };
        f.write_str(name)
    }
}

/// One configured step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    /// A failure here means the deploy must be undone
    pub rollback_on_failure: bool,
}

/// Result of running (or not running) a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Passed,
    Failed { reason: String },
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub kind: StepKind,
    pub rollback_on_failure: bool,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl StepReport {
    pub fn failed(&self) -> bool {
        matches!(self.outcome, StepOutcome::Failed { .. })
    }
}

/// Everything one pipeline run produced
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub module: String,
    pub steps: Vec<StepReport>,
}

impl PipelineReport {
    pub fn passed(&self) -> bool {
        !self.steps.iter().any(StepReport::failed)
    }

    pub fn first_failure(&self) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.failed())
    }

    /// Whether any failed step is marked as a rollback trigger
    pub fn requires_rollback(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.failed() && s.rollback_on_failure)
    }

    /// Validation error for the first failing step, if any
    pub fn failure(&self) -> Option<BuildwrightError> {
        self.steps.iter().find_map(|step| match &step.outcome {
            StepOutcome::Failed { reason } => Some(BuildwrightError::Validation {
                module: self.module.clone(),
                step: step.kind.to_string(),
                reason: reason.clone(),
            }),
            _ => None,
        })
    }

    /// `Ok` if every step passed
    pub fn into_result(self) -> BuildwrightResult<()> {
        match self.failure() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// What a pipeline run needs besides the steps
pub struct CheckContext<'a> {
    pub env: &'a BuildEnvironment,
    pub compiler: &'a dyn Compiler,
    /// Compile matrix
    pub platforms: &'a [Platform],
    /// Host entry file, relative to the host checkout
    pub entry_file: &'a Path,
    /// Compile-matrix entries in flight at once
    pub parallel: usize,
}

/// Ordered steps for one module
#[derive(Debug, Clone)]
pub struct CheckPipeline {
    module: String,
    steps: Vec<Step>,
    mode: RunMode,
}

impl CheckPipeline {
    /// Steps for an extension module. `integrate` adds the host
    /// compatibility step.
    pub fn for_module(module: &str, config: &ChecksConfig, integrate: bool) -> Self {
        let mut kinds = vec![StepKind::StaticAnalysis, StepKind::TestSuite];
        if integrate {
            kinds.push(StepKind::HostCompatibility);
        }
        kinds.push(StepKind::CrossPlatformCompile);

        let steps = kinds
            .into_iter()
            .map(|kind| Step {
                kind,
                rollback_on_failure: config.rollback_on.contains(&kind),
            })
            .collect();
        Self {
            module: module.to_string(),
            steps,
            mode: config.mode,
        }
    }

    /// Steps for the host itself. Its own test suite is what decides
    /// whether the host still works, so it inherits the host-compatibility
    /// rollback setting.
    pub fn for_host(host: &str, config: &ChecksConfig) -> Self {
        let gate = config.rollback_on.contains(&StepKind::HostCompatibility);
        let steps = [
            StepKind::StaticAnalysis,
            StepKind::TestSuite,
            StepKind::CrossPlatformCompile,
        ]
        .into_iter()
        .map(|kind| Step {
            kind,
            rollback_on_failure: config.rollback_on.contains(&kind)
                || (kind == StepKind::TestSuite && gate),
        })
        .collect();
        Self {
            module: host.to_string(),
            steps,
            mode: config.mode,
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run the steps in order under a shared lock on the cache, which
    /// backs every GOPATH lookup the toolchain makes.
    pub async fn run(&self, cx: &CheckContext<'_>) -> PipelineReport {
        let _shared = cx.env.cache().read().await;
        let log = cx.env.log();
        let mut reports = Vec::with_capacity(self.steps.len());
        let mut failed = false;

        for step in &self.steps {
            if failed && self.mode == RunMode::FailFast {
                reports.push(StepReport {
                    kind: step.kind,
                    rollback_on_failure: step.rollback_on_failure,
                    outcome: StepOutcome::Skipped,
                    elapsed: Duration::ZERO,
                });
                continue;
            }

            log.record(format!("Running {} for {}", step.kind, self.module));
            let started = Instant::now();
            let outcome = match self.run_step(step.kind, cx).await {
                Ok(()) => StepOutcome::Passed,
                Err(e) => {
                    failed = true;
                    warn!("{} failed for {}: {}", step.kind, self.module, e);
                    log.record(format!("{} failed for {}: {}", step.kind, self.module, e));
                    StepOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            let elapsed = started.elapsed();
            debug!("{} for {} took {:?}", step.kind, self.module, elapsed);
            reports.push(StepReport {
                kind: step.kind,
                rollback_on_failure: step.rollback_on_failure,
                outcome,
                elapsed,
            });
        }

        PipelineReport {
            module: self.module.clone(),
            steps: reports,
        }
    }

    async fn run_step(&self, kind: StepKind, cx: &CheckContext<'_>) -> BuildwrightResult<()> {
        let dir = cx.env.module_path(&self.module);
        let gopath = cx.env.gopath();
        let log = cx.env.log();
        match kind {
            StepKind::StaticAnalysis => cx.compiler.vet(&gopath, &dir, log).await,
            StepKind::TestSuite => cx.compiler.test(&gopath, &dir, log).await,
            StepKind::HostCompatibility => steps::host_compatibility(&self.module, cx).await,
            StepKind::CrossPlatformCompile => steps::compile_matrix(&self.module, cx).await,
        }
    }
}
