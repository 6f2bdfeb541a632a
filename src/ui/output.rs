//! Styled status lines with a plain fallback

use super::context::UiContext;
use crate::pipeline::{StepOutcome, StepReport};
use console::style;

pub fn intro(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        cliclack::intro(style(title).cyan().bold()).ok();
    } else {
        println!("{}", style(title).cyan().bold());
    }
}

pub fn outro_success(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::outro(style(message).green().bold()).ok();
    } else {
        println!("{} {}", style("[OK]").green(), message);
    }
}

pub fn step_ok(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::success(message).ok();
    } else {
        println!("  {} {}", style("[OK]").green(), message);
    }
}

pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::success(format!("{} ({})", message, style(detail).dim())).ok();
    } else {
        println!("  {} {} ({})", style("[OK]").green(), message, detail);
    }
}

pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::warning(format!("{} - {}", message, style(hint).dim())).ok();
    } else {
        println!("  {} {} - {}", style("[WARN]").yellow(), message, hint);
    }
}

pub fn step_error_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::error(format!("{}: {}", message, style(detail).red())).ok();
    } else {
        println!("  {} {}: {}", style("[FAIL]").red(), message, detail);
    }
}

pub fn step_skipped(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::info(style(format!("{} - skipped", message)).dim()).ok();
    } else {
        println!("  {} {}", style("[-]").dim(), message);
    }
}

/// One line per pipeline step
pub fn step_report(ctx: &UiContext, step: &StepReport) {
    let name = step.kind.to_string();
    match &step.outcome {
        StepOutcome::Passed => {
            step_ok_detail(ctx, &name, &format!("{:.1}s", step.elapsed.as_secs_f64()))
        }
        StepOutcome::Failed { reason } => step_error_detail(ctx, &name, reason),
        StepOutcome::Skipped => step_skipped(ctx, &name),
    }
}

pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    if ctx.use_fancy_output() {
        println!("  {}: {}", style(key).dim(), value);
    } else {
        println!("  {}: {}", key, value);
    }
}
