//! Stage Orchestrator and the [`Reconciler`] entry point.

use std::{ops::ControlFlow, sync::Arc, time::Duration};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
    authority::{AuthorityClient, SafeAuthority, TransactionAuthority},
    catalog::Catalog,
    config::ReconcilerConfig,
    diff::compute_pending,
    error::{ConfigurationError, StageFatalError},
    grant::GrantStatus,
    lane::SingleLane,
    ledger::{JsonRpcLedger, LedgerClient},
    reader::LedgerStateReader,
    report::{RunMode, RunReport},
    stage::Stage,
};

/// Sequences stages and their entries.
///
/// Entries of a stage run on a single lane, a failed entry does not stop its stage.
/// A `StageFatalError` aborts the stage and no later stage is started.
#[derive(Debug)]
pub struct StageOrchestrator {
    /// Submits entries.
    client: AuthorityClient,
    /// Submission lane shared by every stage of the run.
    lane: SingleLane,
}

impl StageOrchestrator {
    /// An orchestrator submitting through `client`.
    #[must_use]
    pub fn new(client: AuthorityClient) -> Self {
        Self {
            client,
            lane: SingleLane::new("submissions"),
        }
    }

    /// Drive `stages` in order. Returns the error that aborted the run, if any.
    pub async fn run(&mut self, stages: &mut [Stage]) -> Option<StageFatalError> {
        for stage in stages.iter_mut() {
            if let Err(err) = stage.start() {
                warn!(error = %err, "Stage can not start");
                continue;
            }
            info!(
                stage = stage.id,
                name = %stage.name,
                pending = stage.pending_indices().len(),
                "Stage started"
            );

            let client = &self.client;
            let pending = stage
                .entries_mut()
                .iter_mut()
                .filter(|entry| entry.status() == GrantStatus::Pending);
            let fatal = self
                .lane
                .run(pending, move |entry| {
                    async move {
                        match client.apply(entry).await {
                            Ok(()) => ControlFlow::Continue(()),
                            Err(fatal) => ControlFlow::Break(fatal),
                        }
                    }
                })
                .await;

            if let Some(fatal) = fatal {
                error!(
                    stage = stage.id,
                    attempted = self.lane.started(),
                    error = %fatal,
                    "Stage aborted, later stages will not start"
                );
                if let Err(err) = stage.abort(&fatal.to_string()) {
                    warn!(error = %err, "Stage can not abort");
                }
                return Some(fatal);
            }
            if let Err(err) = stage.complete() {
                warn!(error = %err, "Stage can not complete");
            }
            info!(stage = stage.id, "Stage completed");
        }
        info!(attempted = self.lane.finished(), "Every stage completed");
        None
    }
}

/// A setting the write path needs and was not given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Missing {
    /// No multisig address.
    Authority,
    /// No chain id.
    ChainId,
    /// No owner key.
    Signer,
}

impl Missing {
    /// The configuration error reported on `apply`.
    fn error(self) -> ConfigurationError {
        match self {
            Missing::Authority => ConfigurationError::MissingSetting("authority address"),
            Missing::ChainId => ConfigurationError::MissingSetting("chain id"),
            Missing::Signer => ConfigurationError::MissingCredential("private key"),
        }
    }
}

/// Write path of a reconciler.
type WritePath = (Arc<dyn TransactionAuthority>, AuthorityClient);

/// Reconciles the ledger with a catalog.
pub struct Reconciler {
    /// Grant reads.
    reader: LedgerStateReader,
    /// Ledger used for the read-only chain check.
    ledger: Arc<dyn LedgerClient>,
    /// Chain the ledger must serve, when known.
    chain_id: Option<u64>,
    /// Authority and client, or what is missing to build them.
    write: Result<WritePath, Missing>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("chain_id", &self.chain_id)
            .field("can_apply", &self.write.is_ok())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Connect to the ledger and authority of `config`.
    ///
    /// Without an authority, chain id and signer the reconciler can only
    /// [`Reconciler::plan`].
    ///
    /// # Errors
    ///
    /// `ConfigurationError::Preflight` when the ledger client can not be created.
    pub fn new(config: &ReconcilerConfig) -> Result<Self, ConfigurationError> {
        let ledger = JsonRpcLedger::new(config.rpc_url.clone(), config.request_timeout)
            .map_err(ConfigurationError::Preflight)?
            .with_poll_interval(config.poll_interval);

        let settings = match (config.authority, config.chain_id, config.signer.clone()) {
            (None, ..) => Err(Missing::Authority),
            (_, None, _) => Err(Missing::ChainId),
            (_, _, None) => Err(Missing::Signer),
            (Some(authority), Some(chain_id), Some(signer)) => Ok((authority, chain_id, signer)),
        };
        let (authority, chain_id, signer) = match settings {
            Ok(settings) => settings,
            Err(missing) => {
                let ledger: Arc<dyn LedgerClient> = Arc::new(ledger);
                let mut reconciler = Self::read_only(ledger, config.chain_id);
                reconciler.write = Err(missing);
                return Ok(reconciler);
            },
        };

        let signer = Arc::new(signer);
        let ledger: Arc<dyn LedgerClient> =
            Arc::new(ledger.with_signer(signer.clone(), chain_id));
        let authority: Arc<dyn TransactionAuthority> = Arc::new(SafeAuthority::new(
            ledger.clone(),
            authority,
            chain_id,
            signer,
        ));
        let mut reconciler =
            Self::with_authority(ledger, authority, config.confirmation_timeout);
        reconciler.chain_id = Some(chain_id);
        Ok(reconciler)
    }

    /// A reconciler that only reads, checking the chain id when one is given.
    #[must_use]
    pub fn read_only(ledger: Arc<dyn LedgerClient>, chain_id: Option<u64>) -> Self {
        Self {
            reader: LedgerStateReader::new(ledger.clone()),
            ledger,
            chain_id,
            write: Err(Missing::Authority),
        }
    }

    /// A reconciler submitting through `authority`.
    #[must_use]
    pub fn with_authority(
        ledger: Arc<dyn LedgerClient>, authority: Arc<dyn TransactionAuthority>,
        confirmation_timeout: Duration,
    ) -> Self {
        let client = AuthorityClient::new(authority.clone(), confirmation_timeout);
        Self {
            reader: LedgerStateReader::new(ledger.clone()),
            ledger,
            chain_id: None,
            write: Ok((authority, client)),
        }
    }

    /// Submit every missing grant of `catalog`, stage by stage.
    ///
    /// # Errors
    ///
    /// A `ConfigurationError` when the authority is not configured or its preflight
    /// checks fail. No stage is started in that case.
    pub async fn apply(&self, catalog: &Catalog) -> Result<RunReport, ConfigurationError> {
        let (authority, client) = self.write.as_ref().map_err(|missing| missing.error())?;
        authority.preflight().await?;

        let started_at = Utc::now();
        let mut stages = compute_pending(catalog, &self.reader).await;
        let mut orchestrator = StageOrchestrator::new(client.clone());
        if let Some(fatal) = orchestrator.run(&mut stages).await {
            error!(error = %fatal, "Run aborted");
        }

        let report = RunReport::new(RunMode::Apply, started_at, stages);
        info!(
            transactions = report.totals.transactions,
            confirmed = report.totals.confirmed,
            failed = report.totals.failed,
            "Run finished"
        );
        Ok(report)
    }

    /// List the missing grants of `catalog` without submitting anything.
    ///
    /// # Errors
    ///
    /// A `ConfigurationError` when a configured chain id does not match the ledger.
    pub async fn plan(&self, catalog: &Catalog) -> Result<RunReport, ConfigurationError> {
        if let Some(expected) = self.chain_id {
            let actual = self
                .ledger
                .chain_id()
                .await
                .map_err(ConfigurationError::Preflight)?;
            if actual != expected {
                return Err(ConfigurationError::ChainMismatch { expected, actual });
            }
        }

        let started_at = Utc::now();
        let stages = compute_pending(catalog, &self.reader).await;
        let report = RunReport::new(RunMode::Plan, started_at, stages);
        info!(
            entries = report.totals.entries,
            already_granted = report.totals.already_granted,
            pending = report.totals.not_started,
            "Plan finished"
        );
        Ok(report)
    }
}
