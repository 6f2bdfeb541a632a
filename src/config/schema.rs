//! Configuration schema for Buildwright
//!
//! Configuration is stored at `~/.config/buildwright/config.toml`

use crate::pipeline::StepKind;
use crate::platform::PlatformFilter;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Package cache settings
    pub cache: CacheConfig,

    /// Host program layout
    pub host: HostConfig,

    /// Workspace provisioning settings
    pub provision: ProvisionConfig,

    /// Check pipeline settings
    pub checks: ChecksConfig,

    /// Platform catalog settings
    pub platforms: PlatformsConfig,

    /// Deadlines for external processes
    pub timeouts: TimeoutsConfig,

    /// External tool executables
    pub tools: ToolsConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Package cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root of the shared package cache (a GOPATH)
    pub root: PathBuf,

    /// Where deploy backups are written (defaults to the system temp dir)
    pub backup_dir: Option<PathBuf>,

    /// Where ephemeral workspaces are created (defaults to the system temp dir)
    pub workspace_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let root = std::env::var_os("GOPATH")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join("go")))
            .unwrap_or_else(|| PathBuf::from("go"));
        Self {
            root,
            backup_dir: None,
            workspace_dir: None,
        }
    }
}

/// Host program layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Module identifier of the host program
    pub module: String,

    /// Version used when a request does not name one
    pub default_version: String,

    /// Entry-point source file, relative to the host checkout
    pub entry_file: PathBuf,

    /// Directory holding the host's main package, relative to the host checkout
    pub main_dir: PathBuf,

    /// Package whose variables receive version metadata at link time
    pub version_package: String,

    /// Base name of the produced binary
    pub binary_name: String,

    /// Files and directories packaged with every binary, relative to the host checkout
    pub dist_assets: Vec<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            module: "github.com/mholt/caddy".to_string(),
            default_version: "master".to_string(),
            entry_file: PathBuf::from("caddy/caddymain/run.go"),
            main_dir: PathBuf::from("caddy"),
            version_package: "github.com/mholt/caddy/caddy/caddymain".to_string(),
            binary_name: "caddy".to_string(),
            dist_assets: vec![
                PathBuf::from("dist/README.txt"),
                PathBuf::from("dist/LICENSES.txt"),
                PathBuf::from("dist/CHANGES.txt"),
                PathBuf::from("dist/init"),
            ],
        }
    }
}

/// Workspace provisioning configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Skip hidden entries (other than version-control metadata) when copying
    pub skip_hidden: bool,

    /// Skip `testdata` directories and `_test.go` files when copying
    pub skip_test_fixtures: bool,
}

/// How the check pipeline reacts to a failed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Stop at the first failing step
    FailFast,
    /// Run every step and report all outcomes
    Full,
}

/// Check pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    /// Default run mode
    pub mode: RunMode,

    /// Compile-matrix entries run concurrently (also passed as `go build -p`)
    pub parallel_builds: usize,

    /// Steps whose failure rolls a deploy back
    pub rollback_on: Vec<StepKind>,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::FailFast,
            parallel_builds: 4,
            rollback_on: vec![StepKind::HostCompatibility],
        }
    }
}

/// Platform catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformsConfig {
    /// Platforms never built or checked
    pub exclude: Vec<PlatformFilter>,
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            exclude: vec![
                PlatformFilter::new("android", "", ""),
                PlatformFilter::new("darwin", "arm", ""),
                PlatformFilter::new("darwin", "arm64", ""),
                PlatformFilter::new("linux", "s390x", ""),
                PlatformFilter::new("nacl", "", ""),
                PlatformFilter::new("plan9", "", ""),
            ],
        }
    }
}

/// Deadlines for external processes, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// fetch, checkout and describe
    pub vcs_secs: u64,

    /// dependency resolution and updates
    pub resolve_secs: u64,

    /// static analysis and test runs
    pub test_secs: u64,

    /// compilation
    pub build_secs: u64,

    /// toolchain queries
    pub query_secs: u64,
}

impl TimeoutsConfig {
    pub fn vcs(&self) -> Duration {
        Duration::from_secs(self.vcs_secs)
    }

    pub fn resolve(&self) -> Duration {
        Duration::from_secs(self.resolve_secs)
    }

    pub fn test(&self) -> Duration {
        Duration::from_secs(self.test_secs)
    }

    pub fn build(&self) -> Duration {
        Duration::from_secs(self.build_secs)
    }

    pub fn query(&self) -> Duration {
        Duration::from_secs(self.query_secs)
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            vcs_secs: 300,
            resolve_secs: 900,
            test_secs: 1200,
            build_secs: 900,
            query_secs: 60,
        }
    }
}

/// External tool executables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub git: String,
    pub go: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            go: "go".to_string(),
        }
    }
}
