//! Per-run grant state.

use serde::Serialize;

use crate::{
    catalog::CatalogEntry,
    error::ReadError,
    primitives::{Address, RoleId, TxHash},
    record::TransactionRecord,
};

/// Position of an entry within the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntryRef {
    /// Stage ordinal.
    pub stage: u32,
    /// Declaration index within the stage.
    pub index: usize,
}

impl std::fmt::Display for EntryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.stage, self.index)
    }
}

/// Lifecycle of a grant within one run.
///
/// ```text
/// Pending -> AlreadyGranted
/// Pending -> Submitted -> Confirmed | Failed
/// Pending -> Skipped          (stage aborted before the entry was attempted)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum GrantStatus {
    /// Not granted on the ledger, or unreadable, and not yet attempted.
    Pending,
    /// Already present on the ledger; nothing to do.
    AlreadyGranted,
    /// Handed to the transaction authority.
    Submitted,
    /// Receipt observed with a success status.
    Confirmed,
    /// Attempt made and did not succeed.
    Failed,
    /// Never attempted because its stage aborted.
    Skipped,
}

impl GrantStatus {
    /// Is this the last status an entry will hold in the run.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GrantStatus::AlreadyGranted
                | GrantStatus::Confirmed
                | GrantStatus::Failed
                | GrantStatus::Skipped
        )
    }

    /// Is `next` a legal successor of this status.
    #[must_use]
    pub fn can_become(self, next: GrantStatus) -> bool {
        use GrantStatus::{AlreadyGranted, Confirmed, Failed, Pending, Skipped, Submitted};
        matches!(
            (self, next),
            (Pending, AlreadyGranted | Submitted | Skipped) | (Submitted, Confirmed | Failed)
        )
    }
}

/// An illegal status change was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("entry {entry}: illegal transition {from} -> {to}")]
pub struct TransitionError {
    /// Entry concerned.
    pub entry: EntryRef,
    /// Current status.
    pub from: GrantStatus,
    /// Requested status.
    pub to: GrantStatus,
}

/// One required grant and its progress in the current run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantEntry {
    /// Catalog position.
    #[serde(flatten)]
    pub entry_ref: EntryRef,
    /// Contract that holds the role.
    pub target_contract: Address,
    /// Role to grant.
    pub role_id: RoleId,
    /// Role name, when the catalog named it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    /// Account receiving the role.
    pub grantee: Address,
    /// Free text.
    pub description: String,
    /// Current status.
    status: GrantStatus,
    /// Ledger transaction hash, once broadcast.
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_hash: Option<TxHash>,
    /// Why the entry failed or was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    /// Read failure that forced this entry to be attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    read_error: Option<String>,
    /// Audit of the submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<TransactionRecord>,
}

impl GrantEntry {
    /// Create a `Pending` entry for a catalog record.
    #[must_use]
    pub fn new(entry_ref: EntryRef, entry: &CatalogEntry) -> Self {
        Self {
            entry_ref,
            target_contract: entry.target_contract,
            role_id: entry.role_id,
            role_name: entry.role_name.clone(),
            grantee: entry.grantee,
            description: entry.description.clone(),
            status: GrantStatus::Pending,
            tx_hash: None,
            error: None,
            read_error: None,
            record: None,
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> GrantStatus {
        self.status
    }

    /// Ledger transaction hash, once broadcast.
    #[must_use]
    pub fn tx_hash(&self) -> Option<TxHash> {
        self.tx_hash
    }

    /// Failure or skip reason.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Read failure that was treated as "not granted".
    #[must_use]
    pub fn read_error(&self) -> Option<&str> {
        self.read_error.as_deref()
    }

    /// Audit of the submission, when one was made.
    #[must_use]
    pub fn record(&self) -> Option<&TransactionRecord> {
        self.record.as_ref()
    }

    /// Short label used in logs and summaries.
    #[must_use]
    pub fn label(&self) -> String {
        let role = self
            .role_name
            .clone()
            .unwrap_or_else(|| self.role_id.to_string());
        format!("{role} to {} on {}", self.grantee, self.target_contract)
    }

    /// Move to `next`, enforcing forward-only transitions.
    fn transition(&mut self, next: GrantStatus) -> Result<(), TransitionError> {
        if self.status.can_become(next) {
            self.status = next;
            Ok(())
        } else {
            Err(TransitionError {
                entry: self.entry_ref,
                from: self.status,
                to: next,
            })
        }
    }

    /// The ledger already holds this grant.
    ///
    /// # Errors
    ///
    /// If the entry is no longer `Pending`.
    pub fn mark_already_granted(&mut self) -> Result<(), TransitionError> {
        self.transition(GrantStatus::AlreadyGranted)
    }

    /// The grant status could not be read; stay `Pending` and remember why.
    pub fn note_read_error(&mut self, err: &ReadError) {
        self.read_error = Some(err.to_string());
    }

    /// The entry was handed to the transaction authority.
    ///
    /// # Errors
    ///
    /// If the entry is no longer `Pending`.
    pub fn mark_submitted(&mut self) -> Result<(), TransitionError> {
        self.transition(GrantStatus::Submitted)
    }

    /// Attach the final submission record and move to its terminal status.
    ///
    /// # Errors
    ///
    /// If the entry is not `Submitted`.
    pub fn complete(&mut self, record: TransactionRecord) -> Result<(), TransitionError> {
        let next = if record.succeeded() {
            GrantStatus::Confirmed
        } else {
            GrantStatus::Failed
        };
        self.transition(next)?;
        if let Some(tx_hash) = record.tx_hash {
            self.tx_hash = Some(tx_hash);
        }
        self.error.clone_from(&record.error_message);
        self.record = Some(record);
        Ok(())
    }

    /// The entry's stage aborted before it was attempted.
    ///
    /// # Errors
    ///
    /// If the entry is not `Pending`.
    pub fn mark_skipped(&mut self, reason: &str) -> Result<(), TransitionError> {
        self.transition(GrantStatus::Skipped)?;
        self.error = Some(reason.to_string());
        Ok(())
    }
}
