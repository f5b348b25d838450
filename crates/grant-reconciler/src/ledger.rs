//! Ledger client.
//!
//! [`LedgerClient`] is the only way the reconciler touches the chain. It is a trait so
//! scenario tests can run against an in-memory ledger; [`JsonRpcLedger`] talks to a
//! real node over Ethereum JSON-RPC.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::{
    abi::{encode_call, Token},
    error::LedgerError,
    primitives::{Address, TxHash},
    signer::LocalSigner,
    tx::LegacyTransaction,
};

/// Handle on a broadcast transaction, used to wait for its receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptHandle {
    /// Hash of the broadcast transaction.
    pub tx_hash: TxHash,
}

/// Outcome of an included transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    /// Did execution succeed.
    pub succeeded: bool,
    /// Block that included the transaction.
    pub block_number: u64,
    /// Gas consumed.
    pub gas_used: u64,
}

/// Read and write access to the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Chain id the endpoint serves.
    async fn chain_id(&self) -> Result<u64, LedgerError>;

    /// Perform a read-only call of `signature` on `contract` and return the raw
    /// return data.
    async fn read(
        &self, contract: Address, signature: &str, args: &[Token],
    ) -> Result<Vec<u8>, LedgerError>;

    /// Broadcast a call from the local signing identity.
    async fn submit(
        &self, to: Address, data: &[u8], value: u128,
    ) -> Result<ReceiptHandle, LedgerError>;

    /// Wait for the receipt of `handle`. `Ok(None)` means no receipt appeared before
    /// `timeout` elapsed.
    async fn await_receipt(
        &self, handle: ReceiptHandle, timeout: Duration,
    ) -> Result<Option<Receipt>, LedgerError>;
}

#[async_trait]
impl<T: LedgerClient + ?Sized> LedgerClient for Arc<T> {
    async fn chain_id(&self) -> Result<u64, LedgerError> {
        (**self).chain_id().await
    }

    async fn read(
        &self, contract: Address, signature: &str, args: &[Token],
    ) -> Result<Vec<u8>, LedgerError> {
        (**self).read(contract, signature, args).await
    }

    async fn submit(
        &self, to: Address, data: &[u8], value: u128,
    ) -> Result<ReceiptHandle, LedgerError> {
        (**self).submit(to, data, value).await
    }

    async fn await_receipt(
        &self, handle: ReceiptHandle, timeout: Duration,
    ) -> Result<Option<Receipt>, LedgerError> {
        (**self).await_receipt(handle, timeout).await
    }
}

/// Headroom added on top of the node's gas estimate, in percent.
const GAS_HEADROOM_PERCENT: u64 = 20;

/// JSON-RPC response envelope.
#[derive(Debug, Deserialize)]
struct RpcResponse {
    /// Call result, `null` for some methods.
    #[serde(default)]
    result: Option<Value>,
    /// Error object.
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// JSON-RPC error object.
#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    /// Error code.
    code: i64,
    /// Error message.
    message: String,
}

/// Transaction receipt, only the fields we look at.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    /// `0x1` success, `0x0` reverted.
    status: String,
    /// Including block.
    block_number: String,
    /// Gas consumed.
    gas_used: String,
}

/// Parse a hex quantity such as `0x1a`.
fn parse_quantity(value: &str) -> Result<u128, LedgerError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::Decode(format!("quantity `{value}`: {e}")))
}

/// Parse a hex quantity that must fit 64 bits.
fn parse_u64(value: &str) -> Result<u64, LedgerError> {
    u64::try_from(parse_quantity(value)?)
        .map_err(|_| LedgerError::Decode(format!("quantity `{value}` exceeds 64 bits")))
}

/// Parse hex data such as `0xdeadbeef`.
fn parse_data(value: &str) -> Result<Vec<u8>, LedgerError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| LedgerError::Decode(format!("data: {e}")))
}

/// Hex encode data for a request.
fn hex_data(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

/// Classify a transport level failure.
fn transport_error(err: &reqwest::Error) -> LedgerError {
    if err.is_timeout() {
        LedgerError::Timeout
    } else if err.is_connect() || err.is_request() {
        LedgerError::Unreachable(err.to_string())
    } else {
        LedgerError::Decode(err.to_string())
    }
}

/// Ledger client speaking Ethereum JSON-RPC over HTTP.
#[derive(Debug)]
pub struct JsonRpcLedger {
    /// Shared HTTP client, every request carries the configured timeout.
    http: reqwest::Client,
    /// Node endpoint.
    url: Url,
    /// Identity used by `submit`, absent for read-only use.
    signer: Option<Arc<LocalSigner>>,
    /// Chain id transactions are signed for.
    chain_id: Option<u64>,
    /// Delay between receipt polls.
    poll_interval: Duration,
    /// Next JSON-RPC request id.
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    /// Default delay between receipt polls.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

    /// A read-only client for `url`.
    ///
    /// # Errors
    ///
    /// If the HTTP client can not be created.
    pub fn new(url: Url, request_timeout: Duration) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;
        Ok(Self {
            http,
            url,
            signer: None,
            chain_id: None,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            next_id: AtomicU64::new(1),
        })
    }

    /// Enable `submit`, signing for `chain_id` with `signer`.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<LocalSigner>, chain_id: u64) -> Self {
        self.signer = Some(signer);
        self.chain_id = Some(chain_id);
        self
    }

    /// Set the delay between receipt polls.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Perform one JSON-RPC call.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "JSON-RPC request");
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        let response = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(LedgerError::Unauthorized(format!("HTTP {status}")));
        }
        if status.is_server_error() {
            return Err(LedgerError::Unavailable(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(LedgerError::Rpc {
                code: i64::from(status.as_u16()),
                message: format!("HTTP {status}"),
            });
        }

        let envelope: RpcResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                LedgerError::Timeout
            } else {
                LedgerError::Decode(e.to_string())
            }
        })?;
        if let Some(err) = envelope.error {
            debug!(method, id, code = err.code, message = %err.message, "JSON-RPC error");
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        serde_json::from_value(envelope.result.unwrap_or(Value::Null))
            .map_err(|e| LedgerError::Decode(format!("{method}: {e}")))
    }

    /// Poll for a receipt until one appears.
    async fn poll_receipt(&self, handle: ReceiptHandle) -> Result<Receipt, LedgerError> {
        let tx_hash = handle.tx_hash.to_string();
        loop {
            match self
                .call::<Option<RawReceipt>>("eth_getTransactionReceipt", json!([tx_hash]))
                .await
            {
                Ok(Some(raw)) => {
                    return Ok(Receipt {
                        succeeded: parse_quantity(&raw.status)? == 1,
                        block_number: parse_u64(&raw.block_number)?,
                        gas_used: parse_u64(&raw.gas_used)?,
                    });
                },
                Ok(None) => debug!(%tx_hash, "Receipt not available yet"),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => warn!(%tx_hash, error = %err, "Receipt poll failed, retrying"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    async fn chain_id(&self) -> Result<u64, LedgerError> {
        let value: String = self.call("eth_chainId", json!([])).await?;
        parse_u64(&value)
    }

    async fn read(
        &self, contract: Address, signature: &str, args: &[Token],
    ) -> Result<Vec<u8>, LedgerError> {
        let data = hex_data(&encode_call(signature, args));
        let value: String = self
            .call("eth_call", json!([{ "to": contract, "data": data }, "latest"]))
            .await?;
        parse_data(&value)
    }

    async fn submit(
        &self, to: Address, data: &[u8], value: u128,
    ) -> Result<ReceiptHandle, LedgerError> {
        let (Some(signer), Some(chain_id)) = (self.signer.as_deref(), self.chain_id) else {
            return Err(LedgerError::Unauthorized(
                "no signing key configured for this ledger client".into(),
            ));
        };
        let from = signer.address();
        let data_hex = hex_data(data);
        let value_hex = format!("{value:#x}");

        let nonce: String = self
            .call("eth_getTransactionCount", json!([from, "pending"]))
            .await?;
        let gas_price: String = self.call("eth_gasPrice", json!([])).await?;
        let estimate: String = self
            .call(
                "eth_estimateGas",
                json!([{ "from": from, "to": to, "data": data_hex, "value": value_hex }]),
            )
            .await?;
        let estimate = parse_u64(&estimate)?;

        let tx = LegacyTransaction {
            nonce: parse_u64(&nonce)?,
            gas_price: parse_quantity(&gas_price)?,
            gas_limit: estimate.saturating_add(estimate / 100 * GAS_HEADROOM_PERCENT),
            to,
            value,
            data: data.to_vec(),
            chain_id,
        };
        let (raw, tx_hash) = tx
            .sign(signer)
            .map_err(|e| LedgerError::Unauthorized(e.to_string()))?;

        let accepted: String = self
            .call("eth_sendRawTransaction", json!([hex_data(&raw)]))
            .await?;
        if accepted.parse::<TxHash>().ok() != Some(tx_hash) {
            warn!(%tx_hash, %accepted, "Node reported a different transaction hash");
        }
        debug!(%tx_hash, nonce = tx.nonce, gas_limit = tx.gas_limit, "Transaction broadcast");
        Ok(ReceiptHandle { tx_hash })
    }

    async fn await_receipt(
        &self, handle: ReceiptHandle, timeout: Duration,
    ) -> Result<Option<Receipt>, LedgerError> {
        match tokio::time::timeout(timeout, self.poll_receipt(handle)).await {
            Ok(receipt) => receipt.map(Some),
            Err(_elapsed) => Ok(None),
        }
    }
}
