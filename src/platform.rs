//! Target platform catalog
//!
//! The toolchain reports its full OS x architecture matrix. Entries with an
//! undifferentiated ARM architecture are expanded into concrete revisions,
//! then anything matching an exclusion rule is dropped.

use crate::error::BuildwrightResult;
use crate::toolchain::Compiler;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// ARM revisions an undifferentiated `arm` entry expands into
pub const ARM_REVISIONS: [&str; 3] = ["5", "6", "7"];

/// The one OS whose toolchain cannot link fully static binaries
pub const DYNAMIC_LINK_OS: &str = "darwin";

/// A buildable target. Field names match `go tool dist list -json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    #[serde(rename = "GOOS")]
    pub os: String,

    #[serde(rename = "GOARCH")]
    pub arch: String,

    /// ARM revision; empty unless `arch` is `arm`
    #[serde(rename = "GOARM", default)]
    pub arm: String,

    /// Whether the toolchain supports native (cgo) linking here
    #[serde(rename = "CgoSupported", default)]
    pub native_linking: bool,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>, arm: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            arm: arm.into(),
            native_linking: false,
        }
    }

    pub fn is_arm(&self) -> bool {
        self.arch == "arm"
    }

    /// Whether builds for this platform must link dynamically
    pub fn requires_dynamic_linking(&self) -> bool {
        self.os == DYNAMIC_LINK_OS
    }

    /// Environment for the compiler when targeting this platform
    pub fn compiler_env(&self) -> Vec<(String, String)> {
        let cgo = if self.requires_dynamic_linking() { "1" } else { "0" };
        vec![
            ("CGO_ENABLED".to_string(), cgo.to_string()),
            ("GOOS".to_string(), self.os.clone()),
            ("GOARCH".to_string(), self.arch.clone()),
            ("GOARM".to_string(), self.arm.clone()),
        ]
    }

    /// Same target, ignoring the native-linking flag
    pub fn same_target(&self, other: &Platform) -> bool {
        self.os == other.os && self.arch == other.arch && self.arm == other.arm
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}{}", self.os, self.arch, self.arm)
    }
}

/// Exclusion rule. Empty fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformFilter {
    pub os: String,
    pub arch: String,
    pub arm: String,
}

impl PlatformFilter {
    pub fn new(os: impl Into<String>, arch: impl Into<String>, arm: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            arm: arm.into(),
        }
    }

    pub fn matches(&self, platform: &Platform) -> bool {
        let field = |rule: &str, value: &str| rule.is_empty() || rule == value;
        field(&self.os, &platform.os)
            && field(&self.arch, &platform.arch)
            && field(&self.arm, &platform.arm)
    }
}

/// Replace each undifferentiated ARM entry with one entry per revision,
/// in place, keeping the order of everything else.
pub fn expand_arm(platforms: Vec<Platform>) -> Vec<Platform> {
    let mut expanded = Vec::with_capacity(platforms.len() + 2);
    for platform in platforms {
        if platform.is_arm() && platform.arm.is_empty() {
            expanded.extend(ARM_REVISIONS.iter().map(|rev| Platform {
                arm: (*rev).to_string(),
                ..platform.clone()
            }));
        } else {
            expanded.push(platform);
        }
    }
    expanded
}

/// Drop every platform matched by any exclusion rule
pub fn apply_exclusions(platforms: Vec<Platform>, exclusions: &[PlatformFilter]) -> Vec<Platform> {
    platforms
        .into_iter()
        .filter(|p| !exclusions.iter().any(|rule| rule.matches(p)))
        .collect()
}

/// Expand then filter a raw toolchain matrix
pub fn catalog_from_raw(raw: Vec<Platform>, exclusions: &[PlatformFilter]) -> Vec<Platform> {
    apply_exclusions(expand_arm(raw), exclusions)
}

/// Query the toolchain and return every platform we build for
pub async fn list(
    compiler: &dyn Compiler,
    exclusions: &[PlatformFilter],
) -> BuildwrightResult<Vec<Platform>> {
    let raw = compiler.list_platforms().await?;
    debug!("Toolchain reports {} platforms", raw.len());
    let platforms = catalog_from_raw(raw, exclusions);
    debug!("{} platforms after expansion and exclusions", platforms.len());
    Ok(platforms)
}
