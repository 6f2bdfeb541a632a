//! Check command - run a module's validation pipeline in a throwaway workspace

use super::{print_report, request_failed};
use crate::cli::args::{CheckArgs, OutputFormat};
use crate::config::Config;
use crate::error::BuildwrightResult;
use crate::ui::{self, TaskSpinner, UiContext};
use crate::worker::Worker;

/// Execute the check command
pub async fn execute(args: CheckArgs, config: &Config) -> BuildwrightResult<()> {
    let ctx = UiContext::detect();
    let worker = Worker::new(config.clone())?;
    let table = args.format == OutputFormat::Table;

    let mut spinner = TaskSpinner::new(&ctx);
    if table {
        spinner.start(&format!("Checking {}", args.module));
    }

    match worker
        .check_module(&args.host_version, &args.module, args.full)
        .await
    {
        Ok(report) => {
            if table {
                spinner.clear();
            }
            print_report(&ctx, &report, args.format)?;
            if table {
                ui::outro_success(&ctx, &format!("{} passed", args.module));
            }
            Ok(())
        }
        Err(failure) => {
            if table {
                spinner.stop_error(&format!("{} failed", args.module));
            }
            Err(request_failed(&ctx, failure, args.format))
        }
    }
}
