//! Staged, idempotent reconciliation of on-chain role grants.
//!
//! A [`Catalog`] declares the role grants that must exist, in ordered stages. A run
//! reads every grant from the ledger, submits only the missing ones through a
//! multisig [`TransactionAuthority`], waits for each confirmation and reports a
//! status for every entry. Running again against an unchanged ledger submits
//! nothing.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use grant_reconciler::{Catalog, Reconciler, ReconcilerConfig};
//!
//! let config = ReconcilerConfig::default_for("http://127.0.0.1:8545".parse()?).chain_id(42161);
//! let catalog = Catalog::load("catalog.json")?;
//! let report = Reconciler::new(&config)?.plan(&catalog).await?;
//! println!("{}", report.to_json()?);
//! # Ok(())
//! # }
//! ```

pub mod abi;
pub mod authority;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod diff;
pub mod error;
pub mod grant;
pub mod lane;
pub mod ledger;
pub mod orchestrator;
pub mod primitives;
pub mod reader;
pub mod record;
pub mod report;
pub mod signer;
pub mod stage;
pub mod tx;

pub use authority::{AuthorityClient, SafeAuthority, TransactionAuthority};
pub use catalog::Catalog;
pub use config::ReconcilerConfig;
pub use error::{AuthorityError, ConfigurationError, LedgerError, ReadError, StageFatalError};
pub use grant::{GrantEntry, GrantStatus};
pub use ledger::{JsonRpcLedger, LedgerClient};
pub use orchestrator::{Reconciler, StageOrchestrator};
pub use primitives::{Address, RoleId, TxHash};
pub use report::RunReport;
pub use signer::LocalSigner;
pub use stage::{Stage, StageStatus};
