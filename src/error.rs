//! Error types for Buildwright
//!
//! All modules use `BuildwrightResult<T>` as their return type.

use crate::pipeline::PipelineReport;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for Buildwright operations
pub type BuildwrightResult<T> = Result<T, BuildwrightError>;

/// All errors that can occur in Buildwright
#[derive(Error, Debug)]
pub enum BuildwrightError {
    // Provisioning errors
    #[error("provisioning {module} ({stage}): {source}")]
    Provisioning {
        module: String,
        stage: &'static str,
        #[source]
        source: Box<BuildwrightError>,
    },

    #[error("Invalid module identifier '{identifier}': {reason}")]
    InvalidModule { identifier: String, reason: String },

    // Validation errors
    #[error("{step} failed for {module}: {reason}")]
    Validation {
        module: String,
        step: String,
        reason: String,
    },

    // Deploy errors
    #[error("Deploy rejected: {0}")]
    DeployRejected(String),

    #[error(
        "Restoring cache {cache} from backup {backup} failed: {reason}; the cache may be unusable"
    )]
    Rollback {
        cache: PathBuf,
        backup: PathBuf,
        reason: String,
    },

    // Injection errors
    #[error(transparent)]
    Injection(#[from] crate::inject::InjectError),

    // Platform errors
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Platform catalog is empty; nothing to compile")]
    EmptyCatalog,

    #[error("{} of {total} platforms failed to compile\n{}", .failures.len(), .failures.join("\n"))]
    CompileMatrix {
        total: usize,
        /// One `platform: error` line per failed target, in catalog order
        failures: Vec<String>,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed to start: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command failed: {command}\n{output}")]
    CommandExecution { command: String, output: String },

    #[error("Command timed out after {}s: {command}", timeout.as_secs())]
    CommandTimeout { command: String, timeout: Duration },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl BuildwrightError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            output: output.into(),
        }
    }

    /// Wrap an error as a provisioning failure for one module
    pub fn provisioning(module: impl Into<String>, stage: &'static str, source: Self) -> Self {
        Self::Provisioning {
            module: module.into(),
            stage,
            source: Box::new(source),
        }
    }

    /// Whether the failure came from the validation pipeline
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Whether the failure left the shared cache in an unknown state
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Rollback { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Rollback { .. } => Some(
                "The backup has been kept. Restore the cache by hand before accepting new deploys.",
            ),
            Self::CommandFailed { .. } => Some("Check that git and go are installed and on PATH"),
            Self::CommandTimeout { .. } => Some("Raise the limits in the [timeouts] config section"),
            Self::UnsupportedPlatform(_) => Some("Run: buildwright platforms"),
            Self::EmptyCatalog => Some("Check the [platforms] exclude rules against: go tool dist list"),
            _ => None,
        }
    }
}

/// A failed request as reported to the caller: the error plus the
/// environment's activity log.
#[derive(Debug, Serialize)]
pub struct RequestFailure {
    /// Rendered error message
    pub message: String,

    /// Cumulative timestamped activity log
    pub log: String,

    /// Per-step outcomes when the request got as far as the check pipeline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PipelineReport>,

    #[serde(skip)]
    pub error: BuildwrightError,
}

impl RequestFailure {
    pub fn new(error: BuildwrightError, log: String) -> Self {
        Self {
            message: error.to_string(),
            log,
            report: None,
            error,
        }
    }

    pub fn with_report(mut self, report: Option<PipelineReport>) -> Self {
        self.report = report;
        self
    }
}

impl std::fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RequestFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
