//! Module references and requested revisions

use crate::error::{BuildwrightError, BuildwrightResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version sentinel meaning "whatever ref was checked out before this one"
pub const PREVIOUS: &str = "previous";

/// A module pinned to a version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleRef {
    pub identifier: String,
    pub version: String,
}

impl ModuleRef {
    pub fn new(identifier: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            version: version.into(),
        }
    }

    pub fn revision(&self) -> Revision {
        Revision::parse(&self.version)
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identifier, self.version)
    }
}

/// `identifier@version`, as accepted on the command line
impl FromStr for ModuleRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (identifier, version) = s
            .rsplit_once('@')
            .ok_or_else(|| format!("expected IDENTIFIER@VERSION, got '{s}'"))?;
        if identifier.is_empty() || version.is_empty() {
            return Err(format!("expected IDENTIFIER@VERSION, got '{s}'"));
        }
        Ok(Self::new(identifier, version))
    }
}

/// What to check out in a module's working copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    /// A commit, tag or branch
    Named(String),
    /// The ref checked out before the current one
    Previous,
}

impl Revision {
    pub fn parse(version: &str) -> Self {
        if version == PREVIOUS {
            Self::Previous
        } else {
            Self::Named(version.to_string())
        }
    }

    /// Argument for `git checkout`
    pub fn checkout_arg(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Previous => "-",
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Previous => f.write_str(PREVIOUS),
        }
    }
}

/// Check that a module identifier is a safe relative path inside a cache
pub fn validate_identifier(identifier: &str) -> BuildwrightResult<()> {
    let invalid = |reason: &str| {
        Err(BuildwrightError::InvalidModule {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        })
    };

    if identifier.is_empty() {
        return invalid("must not be empty");
    }
    if identifier.starts_with('/') || identifier.contains('\\') || identifier.contains('\0') {
        return invalid("must be a relative import path");
    }
    for segment in identifier.split('/') {
        match segment {
            "" => return invalid("must not contain empty path segments"),
            "." | ".." => return invalid("must not contain '.' or '..' segments"),
            _ => {}
        }
    }
    if !identifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-' | '_' | '~'))
    {
        return invalid("must contain only alphanumerics, '/', '.', '-', '_' or '~'");
    }
    Ok(())
}
