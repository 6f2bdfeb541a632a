//! Build assembly
//!
//! Turns a provisioned environment into a packaged artifact for one
//! platform: plug every extension into the host, link the host with its
//! version metadata, then archive the binary with the distribution assets.

mod archive;
mod version;

pub use archive::{pack, ArchiveEntry, ArchiveFormat};
pub use version::{artifact_base_name, binary_file_name, ldflags, short_version};

use crate::config::schema::HostConfig;
use crate::environment::BuildEnvironment;
use crate::error::{BuildwrightError, BuildwrightResult};
use crate::inject::{inject, InjectOutcome};
use crate::platform::Platform;
use crate::toolchain::{BinaryBuild, Compiler, VersionControl};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// A packaged build. The caller owns (and deletes) the file.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub platform: Platform,
    /// Hex SHA-256 of the archive
    pub sha256: String,
}

/// Compiles and packages the host program
pub struct Assembler<'a> {
    vcs: &'a dyn VersionControl,
    compiler: &'a dyn Compiler,
    host: &'a HostConfig,
}

impl<'a> Assembler<'a> {
    pub fn new(vcs: &'a dyn VersionControl, compiler: &'a dyn Compiler, host: &'a HostConfig) -> Self {
        Self { vcs, compiler, host }
    }

    /// Build `env` for `platform` and write the archive into `output_dir`
    pub async fn assemble(
        &self,
        env: &BuildEnvironment,
        platform: &Platform,
        output_dir: &Path,
    ) -> BuildwrightResult<Artifact> {
        let log = env.log();
        let host_dir = env.host_path();
        let extensions = env.extensions();

        let entry = host_dir.join(&self.host.entry_file);
        for module in &extensions {
            if inject(&entry, &module.identifier)? == InjectOutcome::Inserted {
                log.record(format!("Plugged in {}", module));
            }
        }

        let head = self.vcs.describe_head(&host_dir, log).await?;
        let flags = ldflags(&self.host.version_package, &head, Utc::now());

        let version = env.version_of(env.host()).unwrap_or(&self.host.default_version);
        let base = artifact_base_name(&self.host.binary_name, version, platform, !extensions.is_empty());

        // Binary lives only until it is archived
        let staging = tempfile::Builder::new()
            .prefix("build_")
            .tempdir_in(output_dir)
            .map_err(|e| BuildwrightError::io(format!("creating staging dir in {}", output_dir.display()), e))?;
        let binary = staging.path().join(binary_file_name(&base, platform));

        log.record(format!("Building {} for {}", base, platform));
        self.compiler
            .build(
                &BinaryBuild {
                    gopath: env.gopath(),
                    dir: host_dir.join(&self.host.main_dir),
                    platform: platform.clone(),
                    ldflags: flags,
                    output: binary.clone(),
                },
                log,
            )
            .await?;

        let mut entries = self
            .host
            .dist_assets
            .iter()
            .map(|asset| ArchiveEntry::from_path(&host_dir.join(asset)))
            .collect::<BuildwrightResult<Vec<_>>>()?;
        entries.push(ArchiveEntry::from_path(&binary)?);

        let format = ArchiveFormat::for_os(&platform.os);
        let output = output_dir.join(format!("{}.{}", base, format.extension()));
        let archive_path = output.clone();
        tokio::task::spawn_blocking(move || pack(format, &archive_path, &entries))
            .await
            .map_err(|e| BuildwrightError::Internal(format!("packaging task failed: {e}")))??;

        let digest_path = output.clone();
        let sha256 = tokio::task::spawn_blocking(move || sha256_file(&digest_path))
            .await
            .map_err(|e| BuildwrightError::Internal(format!("digest task failed: {e}")))?
            .map_err(|e| BuildwrightError::io(format!("hashing {}", output.display()), e))?;

        log.record(format!("Packaged {} (sha256 {})", output.display(), sha256));
        info!("Assembled {}", output.display());
        Ok(Artifact {
            path: output,
            platform: platform.clone(),
            sha256,
        })
    }
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LockRegistry, PackageCache};
    use crate::environment::ModuleRef;
    use crate::testutil::{write_file, FakeCompiler, FakeVcs, HOST_ENTRY};
    use crate::toolchain::HeadDescription;
    use std::sync::Arc;
    use tempfile::TempDir;

    const HOST: &str = "github.com/mholt/caddy";

    fn environment(dir: &TempDir, version: &str, plugins: &[ModuleRef]) -> BuildEnvironment {
        let cache = PackageCache::open(dir.path().join("cache"), Arc::new(LockRegistry::new())).unwrap();
        let env = BuildEnvironment::new(cache, &ModuleRef::new(HOST, version), plugins, Some(dir.path())).unwrap();
        let host = env.host_path();
        write_file(&host.join("caddy/caddymain/run.go"), HOST_ENTRY);
        write_file(&host.join("dist/README.txt"), "readme\n");
        write_file(&host.join("dist/LICENSES.txt"), "licenses\n");
        write_file(&host.join("dist/CHANGES.txt"), "changes\n");
        write_file(&host.join("dist/init/README.md"), "init\n");
        env
    }

    #[tokio::test]
    async fn custom_linux_build() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let env = environment(&dir, "v1.2.3", &[ModuleRef::new("github.com/x/plugin", "v1")]);
        let vcs = FakeVcs::default();
        vcs.set_head(HeadDescription {
            exact_tag: Some("v1.2.3".to_string()),
            commit: "abc1234".to_string(),
            ..HeadDescription::default()
        });
        let compiler = FakeCompiler::default();
        let host = HostConfig::default();

        let artifact = Assembler::new(&vcs, &compiler, &host)
            .assemble(&env, &Platform::new("linux", "amd64", ""), out.path())
            .await
            .unwrap();

        assert_eq!(
            artifact.path.file_name().unwrap().to_string_lossy(),
            "caddy_v1.2.3_linux_amd64_custom.tar.gz"
        );
        assert_eq!(artifact.sha256.len(), 64);
        // Only the archive remains in the output directory
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 1);

        let entry = std::fs::read_to_string(env.host_path().join("caddy/caddymain/run.go")).unwrap();
        assert!(entry.contains("_ \"github.com/x/plugin\""));

        let build = compiler.calls().into_iter().find(|c| c.starts_with("build ")).unwrap();
        assert!(build.contains("linux/amd64"));
    }

    #[tokio::test]
    async fn plain_windows_build_is_zipped() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let env = environment(&dir, "master", &[]);
        let vcs = FakeVcs::default();
        let compiler = FakeCompiler::default();
        let host = HostConfig::default();

        let artifact = Assembler::new(&vcs, &compiler, &host)
            .assemble(&env, &Platform::new("windows", "amd64", ""), out.path())
            .await
            .unwrap();

        assert_eq!(
            artifact.path.file_name().unwrap().to_string_lossy(),
            "caddy_master_windows_amd64.zip"
        );
        let archive = zip::ZipArchive::new(File::open(&artifact.path).unwrap()).unwrap();
        assert!(archive.file_names().any(|n| n == "caddy_master_windows_amd64.exe"));
        assert!(archive.file_names().any(|n| n == "CHANGES.txt"));

        let entry = std::fs::read_to_string(env.host_path().join("caddy/caddymain/run.go")).unwrap();
        assert_eq!(entry, HOST_ENTRY);
    }

    #[tokio::test]
    async fn compiler_failure_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let env = environment(&dir, "master", &[]);
        let vcs = FakeVcs::default();
        let compiler = FakeCompiler::default();
        compiler.fail("build", "");
        let host = HostConfig::default();

        let result = Assembler::new(&vcs, &compiler, &host)
            .assemble(&env, &Platform::new("linux", "386", ""), out.path())
            .await;

        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }
}
