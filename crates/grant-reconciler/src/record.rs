//! Audit record of one submission attempt.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{grant::EntryRef, primitives::TxHash};

/// What the ledger said about the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
pub enum ReceiptStatus {
    /// Included and executed successfully.
    Success,
    /// Included but reverted.
    Reverted,
    /// No receipt was observed: never broadcast, or not confirmed in time.
    NotObserved,
}

/// Audit of one submission. Created once by the authority client and attached to its
/// entry; never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Entry the submission was made for.
    pub entry_ref: EntryRef,
    /// Multisig transaction hash, when one was computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_tx_hash: Option<TxHash>,
    /// Ledger transaction hash, when broadcast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    /// When the broadcast was accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    /// When the receipt was observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Receipt outcome.
    pub receipt_status: ReceiptStatus,
    /// Block that included the transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// Gas consumed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
    /// Why the attempt did not succeed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TransactionRecord {
    /// Did the grant land on the ledger.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.receipt_status == ReceiptStatus::Success
    }

    /// Was a ledger transaction actually broadcast for this attempt.
    #[must_use]
    pub fn broadcast(&self) -> bool {
        self.tx_hash.is_some()
    }
}
