//! Deploy commands - promote upstream updates into the package cache

use super::{print_report, request_failed};
use crate::cli::args::{DeployHostArgs, DeployModuleArgs, OutputFormat};
use crate::config::Config;
use crate::error::{BuildwrightResult, RequestFailure};
use crate::pipeline::PipelineReport;
use crate::ui::{self, TaskSpinner, UiContext};
use crate::worker::Worker;

/// Execute the deploy-host command
pub async fn execute_host(args: DeployHostArgs, config: &Config) -> BuildwrightResult<()> {
    let ctx = UiContext::detect();
    let worker = Worker::new(config.clone())?;
    let label = config.host.module.clone();

    let mut spinner = start(&ctx, args.format, &label);
    let result = worker.deploy_host(&args.host_version).await;
    finish(&ctx, &mut spinner, args.format, &label, result)
}

/// Execute the deploy-module command
pub async fn execute_module(args: DeployModuleArgs, config: &Config) -> BuildwrightResult<()> {
    let ctx = UiContext::detect();
    let worker = Worker::new(config.clone())?;
    let label = args.module.to_string();

    let mut spinner = start(&ctx, args.format, &label);
    let result = worker
        .deploy_module(&args.host_version, &args.module, &args.roster)
        .await;
    finish(&ctx, &mut spinner, args.format, &label, result)
}

fn start(ctx: &UiContext, format: OutputFormat, label: &str) -> TaskSpinner {
    let mut spinner = TaskSpinner::new(ctx);
    if format == OutputFormat::Table {
        ui::intro(ctx, &format!("Deploy {}", label));
        spinner.start("Backing up, updating and validating");
    }
    spinner
}

fn finish(
    ctx: &UiContext,
    spinner: &mut TaskSpinner,
    format: OutputFormat,
    label: &str,
    result: Result<PipelineReport, RequestFailure>,
) -> BuildwrightResult<()> {
    match result {
        Ok(report) => {
            if format == OutputFormat::Table {
                spinner.clear();
            }
            print_report(ctx, &report, format)?;
            if format == OutputFormat::Table {
                ui::outro_success(ctx, &format!("Deployed {}", label));
            }
            Ok(())
        }
        Err(failure) => {
            if format == OutputFormat::Table {
                spinner.stop_error(&format!("Deploy of {} failed", label));
            }
            Err(request_failed(ctx, failure, format))
        }
    }
}
