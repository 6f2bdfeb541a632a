//! Artifact naming and link-time version metadata

use crate::platform::Platform;
use crate::toolchain::HeadDescription;
use chrono::{DateTime, Utc};

/// Versions that do not look like tags are cut to this many characters
pub const SHORT_VERSION_LEN: usize = 8;

const BUILD_DATE_FORMAT: &str = "%a %b %d %H:%M:%S UTC %Y";

/// Version as it appears in file names: tags verbatim, anything else
/// (usually a commit hash) shortened
pub fn short_version(version: &str) -> &str {
    if version.starts_with('v') {
        return version;
    }
    match version.char_indices().nth(SHORT_VERSION_LEN) {
        Some((cut, _)) => &version[..cut],
        None => version,
    }
}

/// `<binary>_<version>_<os>_<arch>[<arm>][_custom]`
pub fn artifact_base_name(binary: &str, version: &str, platform: &Platform, custom: bool) -> String {
    let mut name = format!(
        "{}_{}_{}_{}",
        binary,
        short_version(version),
        platform.os,
        platform.arch
    );
    if platform.is_arm() {
        name.push_str(&platform.arm);
    }
    if custom {
        name.push_str("_custom");
    }
    name
}

/// Executable file name for `platform`
pub fn binary_file_name(base: &str, platform: &Platform) -> String {
    if platform.os == "windows" {
        format!("{base}.exe")
    } else {
        base.to_string()
    }
}

/// `-ldflags` value setting the version variables in `package`
pub fn ldflags(package: &str, head: &HeadDescription, built_at: DateTime<Utc>) -> String {
    let vars = [
        ("buildDate", built_at.format(BUILD_DATE_FORMAT).to_string()),
        ("gitTag", head.exact_tag.clone().unwrap_or_default()),
        ("gitNearestTag", head.nearest_tag.clone().unwrap_or_default()),
        ("gitCommit", head.commit.clone()),
        ("gitShortStat", head.short_stat.clone()),
        ("gitFilesModified", head.files_modified.clone()),
    ];
    vars.iter()
        .map(|(name, value)| format!("-X \"{}.{}={}\"", package, name, value.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" ")
}
