//! Buildwright - plugin-extended builds over a shared source cache
//!
//! Provisions isolated workspaces from a shared package cache, builds the
//! host program with extension modules plugged in, and deploys upstream
//! updates into the cache behind a backup with automatic rollback.

pub mod assemble;
pub mod cache;
pub mod cli;
pub mod config;
pub mod deploy;
pub mod environment;
pub mod error;
pub mod inject;
pub mod pipeline;
pub mod platform;
pub mod toolchain;
pub mod ui;
pub mod worker;

#[cfg(test)]
mod testutil;

pub use error::{BuildwrightError, BuildwrightResult};
