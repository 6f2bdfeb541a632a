//! CLI argument definitions using clap derive

use crate::environment::ModuleRef;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Buildwright - plugin-extended builds over a shared source cache
///
/// Provisions isolated workspaces from the package cache, builds the host
/// program with extension modules plugged in, and deploys upstream updates
/// into the cache with automatic rollback.
#[derive(Parser, Debug)]
#[command(name = "buildwright")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BUILDWRIGHT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build and package the host for one platform
    Build(BuildArgs),

    /// Update the host in the cache and validate it
    DeployHost(DeployHostArgs),

    /// Update one extension module in the cache and validate it
    DeployModule(DeployModuleArgs),

    /// Run the checks for a module without changing the cache
    Check(CheckArgs),

    /// List the platforms builds can target
    Platforms(PlatformsArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Host version (defaults to the configured default version)
    #[arg(long, default_value = "")]
    pub host_version: String,

    /// Target operating system
    #[arg(long)]
    pub os: String,

    /// Target architecture
    #[arg(long)]
    pub arch: String,

    /// ARM revision (5, 6 or 7) when the architecture is arm
    #[arg(long, default_value = "")]
    pub arm: String,

    /// Extension module to plug in, as id@version (repeatable)
    #[arg(short, long = "module")]
    pub modules: Vec<ModuleRef>,

    /// Directory the archive is written to
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the deploy-host command
#[derive(Parser, Debug)]
pub struct DeployHostArgs {
    /// Host version validated after the update
    #[arg(long, default_value = "")]
    pub host_version: String,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the deploy-module command
#[derive(Parser, Debug)]
pub struct DeployModuleArgs {
    /// Host version the module is validated against
    #[arg(long, default_value = "")]
    pub host_version: String,

    /// Module to update, as id@version
    #[arg(short, long)]
    pub module: ModuleRef,

    /// Other modules to validate together with it, as id@version (repeatable)
    #[arg(short, long)]
    pub roster: Vec<ModuleRef>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Host version the module is checked against
    #[arg(long, default_value = "")]
    pub host_version: String,

    /// Module to check, as id@version
    #[arg(short, long)]
    pub module: ModuleRef,

    /// Run every step even after a failure
    #[arg(long)]
    pub full: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the platforms command
#[derive(Parser, Debug)]
pub struct PlatformsArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    Table,
    /// JSON output
    Json,
}
