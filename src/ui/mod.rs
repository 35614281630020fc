//! Terminal output helpers
//!
//! Fancy output (spinners, dimmed keys) in an interactive terminal, plain
//! bracketed status lines everywhere else. Status output goes to stderr so
//! stdout stays machine-readable.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{key_value, section, step_error, step_ok, step_warn};
pub use progress::TaskSpinner;
