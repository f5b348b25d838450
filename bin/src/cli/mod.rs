//! CLI interpreter for the reconciler

mod apply;
mod build_info;
mod plan;
mod summary;

use std::{process::ExitCode, time::Duration};

use build_info::BUILD_INFO;
use clap::{Args, Parser, Subcommand};
use url::Url;

use crate::logger::LogLevel;

/// Grant Reconciler
///
/// Brings the role grants of a set of contracts in line with a desired state catalog.
/// Missing grants are submitted stage by stage through a Safe multisig, grants already
/// present are left alone, so every run can be repeated safely.
#[derive(Parser)]
#[clap(version = BUILD_INFO)]
pub(crate) struct Cli {
    /// Logging verbosity, logs are written to stderr
    #[clap(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    pub(crate) log_level: LogLevel,

    /// Reconciler subcommand
    #[clap(subcommand)]
    command: Commands,
}

/// Reconciler commands
#[derive(Subcommand)]
enum Commands {
    /// Submit every missing grant through the authority
    Apply(apply::ApplyCommand),
    /// List missing grants without submitting anything
    Plan(plan::PlanCommand),
}

/// Connection settings shared by every command.
#[derive(Args)]
struct LedgerArgs {
    /// Desired state catalog (JSON)
    #[clap(long)]
    catalog: std::path::PathBuf,

    /// Ledger JSON-RPC endpoint
    #[clap(long, env = "RPC_URL")]
    rpc_url: Url,

    /// Timeout of each ledger request
    #[clap(long, value_parser = humantime::parse_duration, default_value = "30s")]
    request_timeout: Duration,
}

impl Cli {
    /// Execute the selected command, returning the process exit code.
    pub(crate) fn exec(self) -> anyhow::Result<ExitCode> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        match self.command {
            Commands::Apply(cmd) => cmd.exec(&runtime),
            Commands::Plan(cmd) => cmd.exec(&runtime),
        }
    }
}
