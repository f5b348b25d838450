//! The Grant Reconciler.

mod cli;
mod logger;

use std::process::ExitCode;

use clap::Parser;
use console::style;
use grant_reconciler::ConfigurationError;

/// Exit code of a run that never started because of a configuration problem.
const CONFIGURATION_ERROR: u8 = 2;
/// Exit code of any other failure outside a run.
const FAILURE: u8 = 1;

/// Process exit code of a command outcome.
///
/// A finished run carries its own code. A `ConfigurationError` anywhere in the error
/// chain gives 2, any other failure gives 1.
fn exit_code(result: &anyhow::Result<ExitCode>) -> ExitCode {
    match result {
        Ok(code) => *code,
        Err(err) if err.downcast_ref::<ConfigurationError>().is_some() => {
            ExitCode::from(CONFIGURATION_ERROR)
        },
        Err(_) => ExitCode::from(FAILURE),
    }
}

/// Runs the command line and maps its outcome to an exit code.
fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    if let Err(err) = logger::init(cli.log_level) {
        eprintln!("{} {err}", style("Logger unavailable:").yellow());
    }

    let result = cli.exec();
    if let Err(err) = &result {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        if err.downcast_ref::<ConfigurationError>().is_some() {
            tracing::error!(error = %err, "Configuration rejected, no stage started");
        } else {
            tracing::error!(error = %err, "Run failed");
        }
    }
    exit_code(&result)
}
