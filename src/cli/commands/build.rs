//! Build command - package the host for one platform

use super::request_failed;
use crate::cli::args::{BuildArgs, OutputFormat};
use crate::config::Config;
use crate::error::{BuildwrightError, BuildwrightResult};
use crate::platform::Platform;
use crate::ui::{self, TaskSpinner, UiContext};
use crate::worker::Worker;
use tokio::fs;

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> BuildwrightResult<()> {
    let ctx = UiContext::detect();
    let worker = Worker::new(config.clone())?;

    fs::create_dir_all(&args.output)
        .await
        .map_err(|e| BuildwrightError::io(format!("creating {}", args.output.display()), e))?;

    let target = Platform::new(args.os, args.arch, args.arm);
    let table = args.format == OutputFormat::Table;
    let mut spinner = TaskSpinner::new(&ctx);
    if table {
        spinner.start(&format!("Building {} for {}", config.host.binary_name, target));
    }

    match worker
        .build(&args.host_version, &target, &args.modules, &args.output)
        .await
    {
        Ok(artifact) => {
            if table {
                spinner.stop(&format!("Built {}", target));
                ui::key_value(&ctx, "archive", &artifact.path.display().to_string());
                ui::key_value(&ctx, "sha256", &artifact.sha256);
            } else {
                println!("{}", serde_json::to_string_pretty(&artifact)?);
            }
            Ok(())
        }
        Err(failure) => {
            if table {
                spinner.stop_error("Build failed");
            }
            Err(request_failed(&ctx, failure, args.format))
        }
    }
}
