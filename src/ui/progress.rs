//! Spinner for long-running requests, with a plain fallback.
//!
//! Closing lines carry the elapsed time, since a build or deploy can run
//! for minutes.

use super::context::UiContext;
use console::style;
use std::time::Instant;

pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    started: Option<Instant>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            started: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    pub fn start(&mut self, message: &str) {
        self.started = Some(Instant::now());
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            eprintln!("{} {}", style("...").dim(), message);
        }
    }

    fn with_elapsed(&mut self, message: &str) -> String {
        match self.started.take() {
            Some(started) => format!("{} ({:.1}s)", message, started.elapsed().as_secs_f64()),
            None => message.to_string(),
        }
    }

    pub fn stop(&mut self, message: &str) {
        let line = self.with_elapsed(message);
        match self.spinner.take() {
            Some(spinner) => spinner.stop(line),
            None => eprintln!("{} {}", style("[OK]").green(), line),
        }
    }

    pub fn stop_error(&mut self, message: &str) {
        let line = self.with_elapsed(message);
        match self.spinner.take() {
            Some(spinner) => spinner.error(line),
            None => eprintln!("{} {}", style("[FAIL]").red(), line),
        }
    }

    /// Remove the spinner without a closing line
    pub fn clear(&mut self) {
        self.started = None;
        if let Some(spinner) = self.spinner.take() {
            spinner.clear();
        }
    }
}
