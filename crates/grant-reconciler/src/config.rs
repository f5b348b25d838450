//! Reconciler configuration.

use std::time::Duration;

use url::Url;

use crate::{primitives::Address, signer::LocalSigner};

/// Default time to wait for a transaction receipt.
const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(180);
/// Default delay between receipt polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Default timeout of a single ledger request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a run needs, built once and passed by reference.
#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// Ledger JSON-RPC endpoint.
    pub rpc_url: Url,
    /// Chain the endpoint must serve. Required to submit.
    pub chain_id: Option<u64>,
    /// Multisig authority address. Required to submit.
    pub authority: Option<Address>,
    /// Owner key of the authority. Required to submit.
    pub signer: Option<LocalSigner>,
    /// Deadline of each confirmation wait.
    pub confirmation_timeout: Duration,
    /// Delay between receipt polls.
    pub poll_interval: Duration,
    /// Timeout of each ledger request.
    pub request_timeout: Duration,
    /// Block explorer used to link transactions in summaries.
    pub explorer_url: Option<Url>,
}

impl ReconcilerConfig {
    /// Read-only defaults for an endpoint.
    #[must_use]
    pub fn default_for(rpc_url: Url) -> Self {
        Self {
            rpc_url,
            chain_id: None,
            authority: None,
            signer: None,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            explorer_url: None,
        }
    }

    /// Sets the chain id the endpoint must serve.
    #[must_use]
    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Sets the multisig authority.
    #[must_use]
    pub fn authority(mut self, authority: Address) -> Self {
        self.authority = Some(authority);
        self
    }

    /// Sets the owner key.
    #[must_use]
    pub fn signer(mut self, signer: LocalSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Sets the confirmation deadline.
    #[must_use]
    pub fn confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Sets the receipt poll interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the ledger request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the block explorer.
    #[must_use]
    pub fn explorer_url(mut self, url: Url) -> Self {
        self.explorer_url = Some(url);
        self
    }
}
