//! CLI command implementations

pub mod build;
pub mod check;
pub mod config;
pub mod deploy;
pub mod platforms;

pub use build::execute as build;
pub use check::execute as check;
pub use config::execute as config;
pub use deploy::execute_host as deploy_host;
pub use deploy::execute_module as deploy_module;
pub use platforms::execute as platforms;

use crate::cli::args::OutputFormat;
use crate::error::{BuildwrightError, RequestFailure};
use crate::pipeline::PipelineReport;
use crate::ui::{self, UiContext};
use console::style;

/// Print a failed request's payload and hand back the error for `main`.
///
/// Step outcomes go first in table mode so the failing step is visible
/// above the log.
pub(crate) fn request_failed(ctx: &UiContext, failure: RequestFailure, format: OutputFormat) -> BuildwrightError {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&failure) {
            Ok(json) => println!("{}", json),
            Err(e) => return e.into(),
        },
        OutputFormat::Table => {
            if let Some(report) = &failure.report {
                for step in &report.steps {
                    ui::step_report(ctx, step);
                }
            }
            if !failure.log.is_empty() {
                eprintln!("{}", style("Activity log:").bold());
                for line in failure.log.lines() {
                    eprintln!("  {}", style(line).dim());
                }
            }
        }
    }
    failure.error
}

pub(crate) fn print_report(ctx: &UiContext, report: &PipelineReport, format: OutputFormat) -> crate::error::BuildwrightResult<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Table => {
            for step in &report.steps {
                ui::step_report(ctx, step);
            }
        }
    }
    Ok(())
}
