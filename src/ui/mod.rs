//! Terminal output for the CLI
//!
//! Uses `cliclack` log lines and spinners on an interactive terminal and
//! falls back to plain bracketed lines in CI or when piped.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    intro, key_value, outro_success, step_error_detail, step_ok, step_ok_detail, step_report,
    step_skipped, step_warn_hint,
};
pub use progress::TaskSpinner;
