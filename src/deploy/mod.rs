//! Deploys: promoting a newer upstream revision into the shared cache
//!
//! A deploy backs the cache up, updates exactly one module in it, then
//! provisions a fresh workspace from the updated cache and validates it.
//! Depending on which step fails, the update is kept (commit) or the cache
//! is restored from the backup (rollback).
//!
//! Backup and update run in one exclusive-lock critical section. Deploys
//! against the same cache are serialized by the cache's deploy slot.

mod transaction;

pub use transaction::{DeployState, DeployTransaction};

use crate::config::Config;
use crate::environment::{ModuleRef, Provisioner};
use crate::error::{BuildwrightError, BuildwrightResult};
use crate::pipeline::{CheckContext, CheckPipeline, PipelineReport};
use crate::platform::Platform;
use crate::toolchain::{Compiler, DependencyResolver};
use std::path::PathBuf;
use tracing::{info, warn};

/// What a deploy updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployTarget {
    /// The host program and everything below it
    Host,
    /// Exactly one extension module
    Module(ModuleRef),
}

impl DeployTarget {
    fn identifier<'a>(&'a self, host: &'a str) -> &'a str {
        match self {
            Self::Host => host,
            Self::Module(module) => &module.identifier,
        }
    }
}

/// Runs deploy transactions
pub struct DeployCoordinator<'a> {
    pub provisioner: &'a Provisioner,
    pub resolver: &'a dyn DependencyResolver,
    pub compiler: &'a dyn Compiler,
    pub config: &'a Config,
    pub platforms: &'a [Platform],
}

impl DeployCoordinator<'_> {
    fn backup_dir(&self) -> PathBuf {
        self.config
            .cache
            .backup_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Drive `tx` from `Idle` through to resolution.
    ///
    /// Returns the pipeline report when validation passes. A validation
    /// failure is returned as an error whether the cache was committed or
    /// rolled back; `tx.state()` tells which and `tx.report()` holds the
    /// per-step outcomes.
    pub async fn deploy(
        &self,
        tx: &mut DeployTransaction<'_>,
        target: &DeployTarget,
    ) -> BuildwrightResult<PipelineReport> {
        let env = tx.env();
        let cache = env.cache();
        let log = env.log();
        let host = env.host();
        let module = target.identifier(host);

        if let DeployTarget::Module(m) = target {
            if m.identifier == host {
                return Err(BuildwrightError::DeployRejected(
                    "deploy the host with a host deploy, not as a module".to_string(),
                ));
            }
            if env.version_of(&m.identifier) != Some(m.version.as_str()) {
                return Err(BuildwrightError::DeployRejected(format!(
                    "{} is not part of this environment",
                    m
                )));
            }
        }
        let whole_tree = matches!(target, DeployTarget::Host);
        let pipeline = match target {
            DeployTarget::Host => CheckPipeline::for_host(host, &self.config.checks),
            DeployTarget::Module(_) => CheckPipeline::for_module(module, &self.config.checks, true),
        };

        let _slot = cache.deploy_slot().await;
        log.record(format!("Deploying {} into {}", module, cache.root().display()));

        let write = cache.write().await;
        tx.back_up(&write, &self.backup_dir()).await?;
        tx.advance(DeployState::Updating)?;
        if let Err(e) = cache.update(&write, self.resolver, module, whole_tree, log).await {
            return self.roll_back(tx, &write, e).await;
        }
        drop(write);

        tx.advance(DeployState::Validating)?;
        if let Err(e) = self.provisioner.provision(env).await {
            let write = cache.write().await;
            return self.roll_back(tx, &write, e).await;
        }

        let cx = CheckContext {
            env,
            compiler: self.compiler,
            platforms: self.platforms,
            entry_file: &self.config.host.entry_file,
            parallel: self.config.checks.parallel_builds,
        };
        let report = pipeline.run(&cx).await;
        tx.record_report(report.clone());

        if report.requires_rollback() {
            if let Some(cause) = report.failure() {
                let write = cache.write().await;
                return self.roll_back(tx, &write, cause).await;
            }
        }

        tx.commit().await?;
        tx.finish()?;
        // The update stays; only rollback-marked steps undo it
        if let Some(failure) = report.failure() {
            warn!("Deployed {} but validation failed", module);
            return Err(failure);
        }
        info!("Deployed {}", module);
        Ok(report)
    }

    async fn roll_back(
        &self,
        tx: &mut DeployTransaction<'_>,
        guard: &crate::cache::WriteGuard,
        cause: BuildwrightError,
    ) -> BuildwrightResult<PipelineReport> {
        tx.env().log().record(format!("Rolling back: {}", cause));
        tx.roll_back(guard).await?;
        tx.finish()?;
        Err(cause)
    }
}
