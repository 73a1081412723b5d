//! Command-line interface.

pub mod commands;
pub mod context;
pub mod output;
pub mod types;

pub use context::AppContext;
pub use types::{Cli, Commands};

/// Exit code for internal errors.
pub const EXIT_INTERNAL_ERROR: i32 = 1;

/// Report an error the way the output mode expects and return the exit code.
pub fn handle_error(err: anyhow::Error, json: bool) -> i32 {
    tracing::error!(error = %format!("{err:#}"), "Command failed");
    if json {
        let body = serde_json::json!({ "error": format!("{err:#}") });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", console::style("error:").red().bold());
    }
    EXIT_INTERNAL_ERROR
}
