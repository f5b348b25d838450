//! Transaction Authority.
//!
//! Every write reaches the ledger through a multi-signature authority. The
//! [`TransactionAuthority`] trait is the seam: [`SafeAuthority`] drives a Safe
//! multisig wallet with a locally held owner key, and scenario tests plug in their
//! own. [`AuthorityClient`] runs the draft, hash, sign, execute and confirm sequence
//! for one entry and records the outcome on it.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    abi::{address_word, decode_address_array, decode_u64, encode_call, uint_word, Token},
    builder::{build, CallPayload},
    error::{AuthorityError, ConfigurationError, LedgerError, StageFatalError},
    grant::GrantEntry,
    ledger::{LedgerClient, Receipt, ReceiptHandle},
    primitives::{keccak256, Address, TxHash},
    record::{ReceiptStatus, TransactionRecord},
    signer::LocalSigner,
};

/// Typed data layout of the Safe signing domain.
pub const DOMAIN_SEPARATOR_TYPEHASH: &str = "EIP712Domain(uint256 chainId,address verifyingContract)";
/// Typed data layout of a Safe transaction.
pub const SAFE_TX_TYPEHASH: &str = "SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)";

/// Safe read of the current transaction nonce.
const NONCE: &str = "nonce()";
/// Safe read of the signature threshold.
const GET_THRESHOLD: &str = "getThreshold()";
/// Safe read of the owner list.
const GET_OWNERS: &str = "getOwners()";
/// Safe write executing an approved transaction.
const EXEC_TRANSACTION: &str =
    "execTransaction(address,uint256,bytes,uint8,uint256,uint256,uint256,address,address,bytes)";

/// How the Safe performs the inner call. Grants are only ever plain calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Operation {
    /// Regular call.
    Call = 0,
}

/// A multisig transaction that has not been signed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeTransaction {
    /// Safe the transaction belongs to.
    pub safe: Address,
    /// Inner call target.
    pub to: Address,
    /// Inner call value.
    pub value: u128,
    /// Inner call data.
    pub data: Vec<u8>,
    /// Call or delegate call.
    pub operation: Operation,
    /// Gas reserved for the inner call, 0 for all available.
    pub safe_tx_gas: u128,
    /// Gas independent of the inner call used for refunds.
    pub base_gas: u128,
    /// Refund gas price, 0 for no refund.
    pub gas_price: u128,
    /// Refund token, zero for native currency.
    pub gas_token: Address,
    /// Refund receiver, zero for the executor.
    pub refund_receiver: Address,
    /// Safe nonce this transaction consumes.
    pub nonce: u64,
}

impl SafeTransaction {
    /// A plain call with no refund settings.
    #[must_use]
    pub fn call(safe: Address, payload: &CallPayload, nonce: u64) -> Self {
        Self {
            safe,
            to: payload.to,
            value: payload.value,
            data: payload.data.clone(),
            operation: Operation::Call,
            safe_tx_gas: 0,
            base_gas: 0,
            gas_price: 0,
            gas_token: Address::ZERO,
            refund_receiver: Address::ZERO,
            nonce,
        }
    }

    /// The EIP-712 digest owners sign, for a Safe on `chain_id`.
    #[must_use]
    pub fn safe_tx_hash(&self, chain_id: u64) -> TxHash {
        let domain_separator = keccak256(
            [
                keccak256(DOMAIN_SEPARATOR_TYPEHASH),
                uint_word(chain_id.into()),
                address_word(&self.safe),
            ]
            .concat(),
        );
        let struct_hash = keccak256(
            [
                keccak256(SAFE_TX_TYPEHASH),
                address_word(&self.to),
                uint_word(self.value),
                keccak256(&self.data),
                uint_word(u128::from(self.operation as u8)),
                uint_word(self.safe_tx_gas),
                uint_word(self.base_gas),
                uint_word(self.gas_price),
                address_word(&self.gas_token),
                address_word(&self.refund_receiver),
                uint_word(self.nonce.into()),
            ]
            .concat(),
        );

        let mut preimage = Vec::with_capacity(66);
        preimage.extend_from_slice(&[0x19, 0x01]);
        preimage.extend_from_slice(&domain_separator);
        preimage.extend_from_slice(&struct_hash);
        TxHash::new(keccak256(preimage))
    }
}

/// A multisig transaction with enough owner signatures to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// The approved transaction.
    pub draft: SafeTransaction,
    /// Digest the owners signed.
    pub safe_tx_hash: TxHash,
    /// Owner signatures, 65 bytes each, ordered by owner address.
    pub signatures: Vec<u8>,
}

/// A quorum based signer that approves writes before they reach the ledger.
#[async_trait]
pub trait TransactionAuthority: Send + Sync {
    /// Start-up checks, run once before any stage.
    async fn preflight(&self) -> Result<(), ConfigurationError>;

    /// Wrap a call in an authority transaction.
    async fn create_transaction(
        &self, payload: &CallPayload,
    ) -> Result<SafeTransaction, AuthorityError>;

    /// Identifier of a draft, the digest owners sign.
    fn hash(&self, draft: &SafeTransaction) -> TxHash;

    /// Collect the signatures needed to execute.
    async fn sign(&self, draft: SafeTransaction) -> Result<SignedTransaction, AuthorityError>;

    /// Broadcast the approved transaction.
    async fn execute(&self, signed: &SignedTransaction) -> Result<ReceiptHandle, AuthorityError>;

    /// Wait for the receipt of an executed transaction.
    async fn confirm(
        &self, handle: ReceiptHandle, timeout: Duration,
    ) -> Result<Receipt, AuthorityError>;
}

/// A Safe multisig wallet driven by one locally held owner key.
pub struct SafeAuthority {
    /// Ledger the Safe lives on.
    ledger: Arc<dyn LedgerClient>,
    /// Safe address.
    safe: Address,
    /// Chain the Safe lives on.
    chain_id: u64,
    /// Owner key.
    signer: Arc<LocalSigner>,
}

impl SafeAuthority {
    /// A Safe at `safe` on `chain_id`, signed for by `signer`.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerClient>, safe: Address, chain_id: u64, signer: Arc<LocalSigner>,
    ) -> Self {
        Self {
            ledger,
            safe,
            chain_id,
            signer,
        }
    }

    /// Current owners of the Safe.
    ///
    /// # Errors
    ///
    /// If the read fails or does not decode.
    pub async fn owners(&self) -> Result<Vec<Address>, LedgerError> {
        let data = self.ledger.read(self.safe, GET_OWNERS, &[]).await?;
        Ok(decode_address_array(&data)?)
    }

    /// Number of owner signatures required to execute.
    ///
    /// # Errors
    ///
    /// If the read fails or does not decode.
    pub async fn threshold(&self) -> Result<u64, LedgerError> {
        let data = self.ledger.read(self.safe, GET_THRESHOLD, &[]).await?;
        Ok(decode_u64(&data)?)
    }

    /// Next Safe transaction nonce.
    ///
    /// # Errors
    ///
    /// If the read fails or does not decode.
    pub async fn nonce(&self) -> Result<u64, LedgerError> {
        let data = self.ledger.read(self.safe, NONCE, &[]).await?;
        Ok(decode_u64(&data)?)
    }
}

impl std::fmt::Debug for SafeAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeAuthority")
            .field("safe", &self.safe)
            .field("chain_id", &self.chain_id)
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

/// Entry scoped read failures during signing are signing failures.
fn signing_error(err: LedgerError) -> AuthorityError {
    if err.is_fatal() {
        err.into()
    } else {
        AuthorityError::Signing(err.to_string())
    }
}

#[async_trait]
impl TransactionAuthority for SafeAuthority {
    async fn preflight(&self) -> Result<(), ConfigurationError> {
        let actual = self
            .ledger
            .chain_id()
            .await
            .map_err(ConfigurationError::Preflight)?;
        if actual != self.chain_id {
            return Err(ConfigurationError::ChainMismatch {
                expected: self.chain_id,
                actual,
            });
        }

        let signer = self.signer.address();
        let owners = self.owners().await.map_err(ConfigurationError::Preflight)?;
        if !owners.contains(&signer) {
            return Err(ConfigurationError::NotAnOwner {
                signer,
                authority: self.safe,
            });
        }

        let threshold = self
            .threshold()
            .await
            .map_err(ConfigurationError::Preflight)?;
        if threshold > 1 {
            warn!(
                safe = %self.safe,
                threshold,
                "Safe needs more signatures than this signer can give, submissions will fail"
            );
        }
        info!(
            safe = %self.safe,
            %signer,
            owners = owners.len(),
            threshold,
            chain_id = self.chain_id,
            "Authority ready"
        );
        Ok(())
    }

    async fn create_transaction(
        &self, payload: &CallPayload,
    ) -> Result<SafeTransaction, AuthorityError> {
        let nonce = self.nonce().await?;
        debug!(safe = %self.safe, nonce, to = %payload.to, "Safe transaction drafted");
        Ok(SafeTransaction::call(self.safe, payload, nonce))
    }

    fn hash(&self, draft: &SafeTransaction) -> TxHash {
        draft.safe_tx_hash(self.chain_id)
    }

    async fn sign(&self, draft: SafeTransaction) -> Result<SignedTransaction, AuthorityError> {
        let threshold = self.threshold().await.map_err(signing_error)?;
        // One owner key is available, so one signature is all we can collect.
        if threshold > 1 {
            return Err(AuthorityError::Signing(format!(
                "Safe threshold is {threshold}, only 1 owner signature available"
            )));
        }

        let safe_tx_hash = self.hash(&draft);
        let signature = self
            .signer
            .sign_digest(safe_tx_hash.as_bytes())
            .map_err(|e| AuthorityError::Signing(e.to_string()))?;
        let mut signatures = Vec::with_capacity(65);
        signatures.extend_from_slice(&signature.r);
        signatures.extend_from_slice(&signature.s);
        signatures.push(signature.recovery_id.saturating_add(27));

        Ok(SignedTransaction {
            draft,
            safe_tx_hash,
            signatures,
        })
    }

    async fn execute(&self, signed: &SignedTransaction) -> Result<ReceiptHandle, AuthorityError> {
        let draft = &signed.draft;
        let data = encode_call(EXEC_TRANSACTION, &[
            Token::Address(draft.to),
            Token::Uint(draft.value),
            Token::Bytes(draft.data.clone()),
            Token::Uint(u128::from(draft.operation as u8)),
            Token::Uint(draft.safe_tx_gas),
            Token::Uint(draft.base_gas),
            Token::Uint(draft.gas_price),
            Token::Address(draft.gas_token),
            Token::Address(draft.refund_receiver),
            Token::Bytes(signed.signatures.clone()),
        ]);
        Ok(self.ledger.submit(self.safe, &data, 0).await?)
    }

    async fn confirm(
        &self, handle: ReceiptHandle, timeout: Duration,
    ) -> Result<Receipt, AuthorityError> {
        self.ledger
            .await_receipt(handle, timeout)
            .await?
            .ok_or(AuthorityError::ConfirmationTimeout(timeout))
    }
}

/// Drives one entry through a [`TransactionAuthority`].
#[derive(Clone)]
pub struct AuthorityClient {
    /// Authority used.
    authority: Arc<dyn TransactionAuthority>,
    /// Deadline of each confirmation wait.
    confirmation_timeout: Duration,
}

impl AuthorityClient {
    /// A client over `authority`.
    #[must_use]
    pub fn new(authority: Arc<dyn TransactionAuthority>, confirmation_timeout: Duration) -> Self {
        Self {
            authority,
            confirmation_timeout,
        }
    }

    /// Submit the grant of `entry` and wait for its confirmation.
    ///
    /// The entry moves to `Submitted` and then to `Confirmed` or `Failed`, with the
    /// transaction record attached. Exactly one transaction is broadcast at most and it
    /// is never retried.
    ///
    /// # Errors
    ///
    /// A `StageFatalError` when the failure is not specific to this entry. The entry is
    /// `Failed` in that case too.
    pub async fn apply(&self, entry: &mut GrantEntry) -> Result<(), StageFatalError> {
        if let Err(err) = entry.mark_submitted() {
            warn!(error = %err, "Entry is not pending, not submitting");
            return Ok(());
        }
        info!(entry = %entry.entry_ref, grant = %entry.label(), "Submitting grant");

        let mut record = TransactionRecord {
            entry_ref: entry.entry_ref,
            safe_tx_hash: None,
            tx_hash: None,
            submitted_at: None,
            confirmed_at: None,
            receipt_status: ReceiptStatus::NotObserved,
            block_number: None,
            gas_used: None,
            error_message: None,
        };
        let payload = build(entry);

        let fatal = match self.attempt(&payload, &mut record).await {
            Ok(()) => None,
            Err(AuthorityError::Fatal(fatal)) => {
                record.error_message = Some(fatal.to_string());
                Some(fatal)
            },
            Err(err) => {
                record.error_message = Some(err.to_string());
                None
            },
        };

        if record.succeeded() {
            info!(
                entry = %entry.entry_ref,
                tx_hash = ?record.tx_hash,
                block = ?record.block_number,
                "Grant confirmed"
            );
        } else {
            warn!(
                entry = %entry.entry_ref,
                tx_hash = ?record.tx_hash,
                error = ?record.error_message,
                "Grant failed"
            );
        }

        if let Err(err) = entry.complete(record) {
            warn!(error = %err, "Entry could not be completed");
        }
        fatal.map_or(Ok(()), Err)
    }

    /// Run the authority sequence, filling `record` as it progresses.
    async fn attempt(
        &self, payload: &CallPayload, record: &mut TransactionRecord,
    ) -> Result<(), AuthorityError> {
        let draft = self.authority.create_transaction(payload).await?;
        record.safe_tx_hash = Some(self.authority.hash(&draft));
        let signed = self.authority.sign(draft).await?;

        let handle = self.authority.execute(&signed).await?;
        record.tx_hash = Some(handle.tx_hash);
        record.submitted_at = Some(Utc::now());
        debug!(entry = %record.entry_ref, tx_hash = %handle.tx_hash, "Awaiting confirmation");

        let receipt = self
            .authority
            .confirm(handle, self.confirmation_timeout)
            .await?;
        record.confirmed_at = Some(Utc::now());
        record.block_number = Some(receipt.block_number);
        record.gas_used = Some(receipt.gas_used);
        if receipt.succeeded {
            record.receipt_status = ReceiptStatus::Success;
        } else {
            record.receipt_status = ReceiptStatus::Reverted;
            record.error_message = Some(format!(
                "Transaction reverted in block {}",
                receipt.block_number
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for AuthorityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityClient")
            .field("confirmation_timeout", &self.confirmation_timeout)
            .finish_non_exhaustive()
    }
}
