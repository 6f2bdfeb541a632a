//! Populating a workspace from the package cache

use crate::cache::{copy::deep_copy_async, CopyOptions};
use crate::environment::{BuildEnvironment, ModuleRef};
use crate::error::{BuildwrightError, BuildwrightResult};
use crate::toolchain::{DependencyResolver, VersionControl};
use std::sync::Arc;
use tracing::info;

/// Fills a [`BuildEnvironment`]'s workspace with the requested module versions
#[derive(Clone)]
pub struct Provisioner {
    vcs: Arc<dyn VersionControl>,
    resolver: Arc<dyn DependencyResolver>,
    copy: CopyOptions,
}

impl Provisioner {
    pub fn new(
        vcs: Arc<dyn VersionControl>,
        resolver: Arc<dyn DependencyResolver>,
        copy: CopyOptions,
    ) -> Self {
        Self {
            vcs,
            resolver,
            copy,
        }
    }

    /// Provision every module of `env`, host first.
    ///
    /// Stops at the first failure. The partial workspace is left for the
    /// environment's owner to discard.
    pub async fn provision(&self, env: &BuildEnvironment) -> BuildwrightResult<()> {
        let modules = env.modules();
        env.log().record(format!(
            "Provisioning {} module(s) into {}",
            modules.len(),
            env.workspace().display()
        ));
        for module in &modules {
            let whole_tree = module.identifier == env.host();
            self.provision_module(env, module, whole_tree).await?;
        }
        info!("Provisioned {}", env.workspace().display());
        Ok(())
    }

    async fn provision_module(
        &self,
        env: &BuildEnvironment,
        module: &ModuleRef,
        whole_tree: bool,
    ) -> BuildwrightResult<()> {
        let id = module.identifier.as_str();
        let cache = env.cache();
        let log = env.log();
        let fail = |stage: &'static str| move |e: BuildwrightError| BuildwrightError::provisioning(id, stage, e);

        // Only adds what is missing; existing checkouts are left alone
        let write = cache.write().await;
        cache
            .ensure_present(&write, self.resolver.as_ref(), id, whole_tree, log)
            .await
            .map_err(fail("resolve in cache"))?;

        let _read = write.downgrade();
        let source = cache.module_path(id);
        let target = env.module_path(id);
        let files = deep_copy_async(source.clone(), target.clone(), self.copy)
            .await
            .map_err(|e| {
                BuildwrightError::provisioning(
                    id,
                    "copy",
                    BuildwrightError::io(
                        format!("copying {} to {}", source.display(), target.display()),
                        e,
                    ),
                )
            })?;
        log.record(format!("Copied {} files of {} into workspace", files, id));

        self.vcs.fetch(&target, log).await.map_err(fail("fetch"))?;
        self.vcs
            .checkout(&target, &module.revision(), log)
            .await
            .map_err(fail("checkout"))?;

        // The checked-out revision may need dependencies the cached tip did not
        self.resolver
            .ensure_present(&env.gopath(), id, true, log)
            .await
            .map_err(fail("resolve in workspace"))?;

        log.record(format!("Provisioned {}", module));
        Ok(())
    }
}
