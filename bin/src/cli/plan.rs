//! Plan cli command

use std::process::ExitCode;

use clap::Args;
use console::Emoji;
use grant_reconciler::{Catalog, Reconciler, ReconcilerConfig};
use tokio::runtime::Runtime;

use super::{summary, LedgerArgs};

/// Plan cli command
#[derive(Args)]
pub(crate) struct PlanCommand {
    /// Catalog and ledger endpoint
    #[clap(flatten)]
    ledger: LedgerArgs,

    /// Chain the endpoint must serve, checked when given
    #[clap(long, env = "CHAIN_ID")]
    chain_id: Option<u64>,
}

impl PlanCommand {
    /// Run cli command
    pub(crate) fn exec(self, runtime: &Runtime) -> anyhow::Result<ExitCode> {
        let catalog = Catalog::load(&self.ledger.catalog)?;
        let mut config = ReconcilerConfig::default_for(self.ledger.rpc_url)
            .request_timeout(self.ledger.request_timeout);
        if let Some(chain_id) = self.chain_id {
            config = config.chain_id(chain_id);
        }

        eprintln!(
            "{} Reading {} grants, nothing will be submitted",
            Emoji::new("🔎", ""),
            catalog.len()
        );
        let report = runtime.block_on(async {
            let reconciler = Reconciler::new(&config)?;
            reconciler.plan(&catalog).await
        })?;

        summary::print(&report, None);
        println!("{}", report.to_json()?);
        Ok(ExitCode::from(report.exit_code()))
    }
}
