//! Error handling and display for the CLI.

use brats_platform::PlatformError;
use brats_verify::SuiteError;
use colored::Colorize;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{failed} of {total} scenario(s) failed")]
    ScenariosFailed { failed: usize, total: usize },

    #[error("Invalid timeout {flag}: must be greater than zero")]
    InvalidTimeout { flag: &'static str },

    #[error(transparent)]
    Suite(#[from] SuiteError),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    for cause in err.chain().skip(1) {
        eprintln!("  {} {}", "caused by:".dimmed(), cause);
    }

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::ScenariosFailed { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: Rerun with --teardown on-success to keep failed apps for inspection."
                        .yellow()
                );
            }
            CliError::Suite(SuiteError::UnknownScenario(_)) => {
                eprintln!(
                    "\n{}",
                    "Hint: Run `brats list` to see available scenario names.".yellow()
                );
            }
            _ => {}
        }
    }
}
