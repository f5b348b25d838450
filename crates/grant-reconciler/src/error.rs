//! Library Crates Defined Errors

use std::{fmt, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::{abi::AbiError, primitives::Address};

/// Failure talking to the ledger endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The endpoint could not be reached at all.
    #[error("Ledger endpoint unreachable: {0}")]
    Unreachable(String),
    /// The endpoint answered with a server error, it may recover.
    #[error("Ledger endpoint unavailable: {0}")]
    Unavailable(String),
    /// The endpoint refused our credentials.
    #[error("Ledger endpoint rejected credentials: {0}")]
    Unauthorized(String),
    /// A request did not complete within its deadline.
    #[error("Ledger request timed out")]
    Timeout,
    /// The endpoint answered with a JSON-RPC error object.
    #[error("Ledger error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },
    /// The response could not be decoded.
    #[error("Malformed ledger response: {0}")]
    Decode(String),
}

impl LedgerError {
    /// Does this failure mean every further ledger operation will fail the same way.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::Unreachable(_) | LedgerError::Unauthorized(_))
    }
}

impl From<AbiError> for LedgerError {
    fn from(err: AbiError) -> Self {
        LedgerError::Decode(err.to_string())
    }
}

/// A grant status read that could not be answered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Grant status on {contract} unreadable: {source}")]
pub struct ReadError {
    /// Contract that was queried.
    pub contract: Address,
    /// Underlying ledger failure.
    #[source]
    pub source: LedgerError,
}

/// Conditions under which no further entry in the run can succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageFatalError {
    /// The ledger can not be reached.
    #[error("Ledger unreachable: {0}")]
    LedgerUnreachable(String),
    /// The ledger or signer rejected our credentials.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Failures raised by a transaction authority while processing one entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    /// The quorum or key needed to sign is unavailable.
    #[error("Signing failed: {0}")]
    Signing(String),
    /// The ledger rejected the broadcast.
    #[error("Submission rejected: {0}")]
    Submission(String),
    /// No receipt was observed before the deadline.
    #[error("No confirmation within {0:?}")]
    ConfirmationTimeout(Duration),
    /// The failure is not specific to this entry.
    #[error(transparent)]
    Fatal(#[from] StageFatalError),
}

impl From<LedgerError> for AuthorityError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Unreachable(msg) => StageFatalError::LedgerUnreachable(msg).into(),
            LedgerError::Unauthorized(msg) => StageFatalError::InvalidCredentials(msg).into(),
            other => AuthorityError::Submission(other.to_string()),
        }
    }
}

/// Problems detected before any stage starts.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The catalog file could not be read.
    #[error("Can not read `{0}`: {1}")]
    Io(PathBuf, std::io::Error),
    /// The catalog file is not valid JSON for the catalog format.
    #[error("Can not parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    /// The catalog decoded but failed validation.
    #[error("Invalid catalog:\n{0}")]
    Invalid(Problems),
    /// No signing credential was supplied.
    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),
    /// A setting needed to submit was not supplied.
    #[error("Missing setting: {0}")]
    MissingSetting(&'static str),
    /// The signing credential is malformed.
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),
    /// The endpoint serves a different chain than configured.
    #[error("Chain id mismatch. Wanted {expected} Got {actual}")]
    ChainMismatch {
        /// Configured chain id.
        expected: u64,
        /// Chain id the endpoint reports.
        actual: u64,
    },
    /// The signer is not one of the authority owners.
    #[error("Signer {signer} is not an owner of authority {authority}")]
    NotAnOwner {
        /// Signer address.
        signer: Address,
        /// Authority address.
        authority: Address,
    },
    /// A start-up check against the ledger failed.
    #[error("Preflight check failed: {0}")]
    Preflight(LedgerError),
}

/// Every problem found while validating a catalog, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Problems(Vec<String>);

impl fmt::Display for Problems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for problem in &self.0 {
            writeln!(f, "- {problem}")?;
        }
        Ok(())
    }
}

impl Problems {
    /// Create a new empty `Problems`
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Record a problem.
    pub fn add(&mut self, problem: impl Into<String>) {
        self.0.push(problem.into());
    }

    /// Recorded problems, in the order found.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Return the problems as an error if any were recorded, or `Ok(val)`.
    ///
    /// # Errors
    ///
    /// `ConfigurationError::Invalid` when at least one problem was recorded.
    pub fn return_result<T>(self, val: T) -> std::result::Result<T, ConfigurationError> {
        if self.0.is_empty() {
            Ok(val)
        } else {
            Err(ConfigurationError::Invalid(self))
        }
    }
}
