//! Apply cli command

use std::{process::ExitCode, time::Duration};

use clap::Args;
use console::Emoji;
use grant_reconciler::{
    Address, Catalog, ConfigurationError, LocalSigner, Reconciler, ReconcilerConfig,
};
use tokio::runtime::Runtime;
use url::Url;

use super::{summary, LedgerArgs};

/// Apply cli command
#[derive(Args)]
pub(crate) struct ApplyCommand {
    /// Catalog and ledger endpoint
    #[clap(flatten)]
    ledger: LedgerArgs,

    /// Chain the endpoint must serve
    #[clap(long, env = "CHAIN_ID")]
    chain_id: u64,

    /// Safe multisig holding the admin roles
    #[clap(long, env = "SAFE_ADDRESS")]
    authority: Address,

    /// Hex secret key of a Safe owner
    #[clap(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Deadline of each confirmation wait
    #[clap(long, value_parser = humantime::parse_duration, default_value = "3m")]
    confirmation_timeout: Duration,

    /// Delay between receipt polls
    #[clap(long, value_parser = humantime::parse_duration, default_value = "2s")]
    poll_interval: Duration,

    /// Block explorer used to link transactions in the summary
    #[clap(long, env = "EXPLORER_URL")]
    explorer_url: Option<Url>,
}

impl ApplyCommand {
    /// Run cli command
    pub(crate) fn exec(self, runtime: &Runtime) -> anyhow::Result<ExitCode> {
        let catalog = Catalog::load(&self.ledger.catalog)?;
        let key = self
            .private_key
            .ok_or(ConfigurationError::MissingCredential("private key"))?;

        let mut config = ReconcilerConfig::default_for(self.ledger.rpc_url)
            .chain_id(self.chain_id)
            .authority(self.authority)
            .signer(LocalSigner::from_hex(&key)?)
            .confirmation_timeout(self.confirmation_timeout)
            .poll_interval(self.poll_interval)
            .request_timeout(self.ledger.request_timeout);
        if let Some(explorer) = self.explorer_url {
            config = config.explorer_url(explorer);
        }

        eprintln!(
            "{} Reconciling {} entries through {}",
            Emoji::new("🔐", ""),
            catalog.len(),
            self.authority
        );
        let report = runtime.block_on(async {
            let reconciler = Reconciler::new(&config)?;
            reconciler.apply(&catalog).await
        })?;

        summary::print(&report, config.explorer_url.as_ref());
        println!("{}", report.to_json()?);
        Ok(ExitCode::from(report.exit_code()))
    }
}
