//! Platforms command - show the build target catalog

use crate::cli::args::{OutputFormat, PlatformsArgs};
use crate::config::Config;
use crate::error::BuildwrightResult;
use crate::platform::Platform;
use crate::worker::Worker;
use console::style;

/// Execute the platforms command
pub async fn execute(args: PlatformsArgs, config: &Config) -> BuildwrightResult<()> {
    let worker = Worker::new(config.clone())?;
    let platforms = worker.supported_platforms().await?;

    match args.format {
        OutputFormat::Table => print_table(&platforms),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&platforms)?),
    }
    Ok(())
}

fn print_table(platforms: &[Platform]) {
    println!(
        "{:<12} {:<10} {:<5} {:<8}",
        style("OS").bold(),
        style("ARCH").bold(),
        style("ARM").bold(),
        style("LINKING").bold()
    );
    println!("{}", "-".repeat(38));

    for platform in platforms {
        let linking = if platform.requires_dynamic_linking() {
            style("dynamic").yellow()
        } else {
            style("static").dim()
        };
        println!(
            "{:<12} {:<10} {:<5} {:<8}",
            platform.os, platform.arch, platform.arm, linking
        );
    }

    println!();
    println!("{} platform(s)", platforms.len());
}
