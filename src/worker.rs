//! Worker service: the four request kinds over one shared cache
//!
//! A `Worker` owns the lock registry, the external tools and the package
//! cache handle. Each request gets its own [`BuildEnvironment`]; failures are
//! returned as [`RequestFailure`] carrying that environment's activity log.

use crate::assemble::{Artifact, Assembler};
use crate::cache::{CopyOptions, LockRegistry, PackageCache};
use crate::config::{Config, RunMode};
use crate::deploy::{DeployCoordinator, DeployTarget, DeployTransaction};
use crate::environment::{BuildEnvironment, ModuleRef, Provisioner};
use crate::error::{BuildwrightError, BuildwrightResult, RequestFailure};
use crate::pipeline::{CheckContext, CheckPipeline, PipelineReport};
use crate::platform::{self, Platform};
use crate::toolchain::Tools;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Worker {
    config: Config,
    locks: Arc<LockRegistry>,
    tools: Tools,
    cache: PackageCache,
}

impl Worker {
    /// Worker using the system git and go toolchain
    pub fn new(config: Config) -> BuildwrightResult<Self> {
        let tools = Tools::system(&config);
        Self::with_tools(config, tools, Arc::new(LockRegistry::new()))
    }

    pub fn with_tools(config: Config, tools: Tools, locks: Arc<LockRegistry>) -> BuildwrightResult<Self> {
        let cache = PackageCache::open(config.cache.root.clone(), locks.clone())?;
        Ok(Self {
            config,
            locks,
            tools,
            cache,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &PackageCache {
        &self.cache
    }

    pub fn locks(&self) -> &Arc<LockRegistry> {
        &self.locks
    }

    fn provisioner(&self) -> Provisioner {
        let copy = CopyOptions {
            skip_hidden: self.config.provision.skip_hidden,
            skip_test_fixtures: self.config.provision.skip_test_fixtures,
            link_vcs_objects: false,
        };
        Provisioner::new(self.tools.vcs.clone(), self.tools.resolver.clone(), copy)
    }

    /// Every platform a build may target
    pub async fn supported_platforms(&self) -> BuildwrightResult<Vec<Platform>> {
        platform::list(self.tools.compiler.as_ref(), &self.config.platforms.exclude).await
    }

    fn host_ref(&self, version: &str) -> ModuleRef {
        let version = if version.is_empty() {
            self.config.host.default_version.as_str()
        } else {
            version
        };
        ModuleRef::new(&self.config.host.module, version)
    }

    fn environment(&self, host_version: &str, extensions: &[ModuleRef]) -> Result<BuildEnvironment, RequestFailure> {
        BuildEnvironment::new(
            self.cache.clone(),
            &self.host_ref(host_version),
            extensions,
            self.config.cache.workspace_dir.as_deref(),
        )
        .map_err(|e| RequestFailure::new(e, String::new()))
    }

    /// Build the host at `host_version` with `modules` plugged in, for one
    /// platform. The archive is written into `output_dir`.
    pub async fn build(
        &self,
        host_version: &str,
        target: &Platform,
        modules: &[ModuleRef],
        output_dir: &Path,
    ) -> Result<Artifact, RequestFailure> {
        let env = self.environment(host_version, modules)?;
        let result = self.build_in(&env, target, output_dir).await;
        finish(env, result)
    }

    async fn build_in(
        &self,
        env: &BuildEnvironment,
        target: &Platform,
        output_dir: &Path,
    ) -> BuildwrightResult<Artifact> {
        let catalog = self.supported_platforms().await?;
        let platform = catalog
            .into_iter()
            .find(|p| p.same_target(target))
            .ok_or_else(|| BuildwrightError::UnsupportedPlatform(target.to_string()))?;

        self.provisioner().provision(env).await?;

        // The compiler falls back to the cache for anything not in the workspace
        let _read = env.cache().read().await;
        Assembler::new(self.tools.vcs.as_ref(), self.tools.compiler.as_ref(), &self.config.host)
            .assemble(env, &platform, output_dir)
            .await
    }

    /// Promote the latest upstream host into the cache
    pub async fn deploy_host(&self, host_version: &str) -> Result<PipelineReport, RequestFailure> {
        let env = self.environment(host_version, &[])?;
        let result = self.deploy_in(&env, &DeployTarget::Host).await;
        finish(env, result)
    }

    /// Promote the latest upstream `module` into the cache, validating it
    /// together with `roster`. The target's version wins over a roster entry
    /// with the same identifier.
    pub async fn deploy_module(
        &self,
        host_version: &str,
        module: &ModuleRef,
        roster: &[ModuleRef],
    ) -> Result<PipelineReport, RequestFailure> {
        let mut extensions: Vec<ModuleRef> = roster
            .iter()
            .filter(|m| m.identifier != module.identifier)
            .cloned()
            .collect();
        extensions.push(module.clone());

        let env = self.environment(host_version, &extensions)?;
        let result = self
            .deploy_in(&env, &DeployTarget::Module(module.clone()))
            .await;
        finish(env, result)
    }

    async fn deploy_in(&self, env: &BuildEnvironment, target: &DeployTarget) -> Result<PipelineReport, Failed> {
        let platforms = self.supported_platforms().await?;
        let provisioner = self.provisioner();
        let coordinator = DeployCoordinator {
            provisioner: &provisioner,
            resolver: self.tools.resolver.as_ref(),
            compiler: self.tools.compiler.as_ref(),
            config: &self.config,
            platforms: &platforms,
        };
        let mut tx = DeployTransaction::begin(env);
        let result = coordinator.deploy(&mut tx, target).await;
        info!("Deploy finished in state {}", tx.state());
        result.map_err(|error| Failed {
            error,
            report: tx.take_report(),
        })
    }

    /// Provision `module` next to the host and run its checks without
    /// touching the cache
    pub async fn check_module(
        &self,
        host_version: &str,
        module: &ModuleRef,
        full: bool,
    ) -> Result<PipelineReport, RequestFailure> {
        let env = self.environment(host_version, std::slice::from_ref(module))?;
        let result = self.check_in(&env, module, full).await;
        finish(env, result)
    }

    async fn check_in(&self, env: &BuildEnvironment, module: &ModuleRef, full: bool) -> Result<PipelineReport, Failed> {
        let platforms = self.supported_platforms().await?;
        self.provisioner().provision(env).await?;

        let mode = if full { RunMode::Full } else { self.config.checks.mode };
        let pipeline = CheckPipeline::for_module(&module.identifier, &self.config.checks, true).with_mode(mode);
        let cx = CheckContext {
            env,
            compiler: self.tools.compiler.as_ref(),
            platforms: &platforms,
            entry_file: &self.config.host.entry_file,
            parallel: self.config.checks.parallel_builds,
        };
        let report = pipeline.run(&cx).await;
        match report.failure() {
            Some(error) => Err(Failed {
                error,
                report: Some(report),
            }),
            None => Ok(report),
        }
    }
}

/// An error and, if the request reached the check pipeline, its report
struct Failed {
    error: BuildwrightError,
    report: Option<PipelineReport>,
}

impl From<BuildwrightError> for Failed {
    fn from(error: BuildwrightError) -> Self {
        Self { error, report: None }
    }
}

/// Close the environment and attach its log to a failure
fn finish<T, E: Into<Failed>>(env: BuildEnvironment, result: Result<T, E>) -> Result<T, RequestFailure> {
    match result {
        Ok(value) => {
            if let Err(e) = env.close() {
                warn!("Request succeeded but cleanup failed: {}", e);
            }
            Ok(value)
        }
        Err(failed) => {
            let Failed { error, report } = failed.into();
            let log = env.log().render();
            drop(env);
            Err(RequestFailure::new(error, log).with_report(report))
        }
    }
}
