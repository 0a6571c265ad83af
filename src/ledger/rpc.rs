// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Ethereum JSON-RPC ledger client.
//!
//! Writes go through `eth_sendTransaction` from a node-managed account, then
//! poll `eth_getTransactionReceipt` until the configured number of
//! confirmations is reached. The whole wait is bounded by
//! `confirmation_timeout_ms`; an unconfirmed write surfaces as
//! [`LedgerError::ConfirmationTimeout`] instead of hanging.
//!
//! Reads are a single `eth_call` against `latest`.
//!
//! Every HTTP round trip passes through one [`CircuitBreaker`]. Only transport
//! failures count against it; JSON-RPC error objects mean the node is up.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::IntegrityConfig;
use crate::hasher::SectionHashes;
use crate::metrics::{self, LatencyTimer};
use crate::record::PatientId;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
use crate::resilience::retry::{retry, RetryConfig};

use super::abi;
use super::{Ledger, LedgerEntry, LedgerError, TxReceipt};

const BACKEND: &str = "rpc";

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Error, Debug)]
enum RpcFailure {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("circuit open")]
    Rejected,
    #[error("rpc error {code}: {message}")]
    Node { code: i64, message: String },
    #[error("ledger client closed")]
    Closed,
}

impl RpcFailure {
    fn into_write(self) -> LedgerError {
        match self {
            Self::Rejected | Self::Closed => LedgerError::Unavailable,
            other => LedgerError::Write(other.to_string()),
        }
    }

    fn into_read(self) -> LedgerError {
        match self {
            Self::Rejected | Self::Closed => LedgerError::Unavailable,
            other => LedgerError::Read(other.to_string()),
        }
    }

    /// `eth_call` reverted (geth/anvil use code 3, hardhat reports it in the message).
    fn is_revert(&self) -> bool {
        match self {
            Self::Node { code, message } => *code == 3 || message.contains("revert"),
            _ => false,
        }
    }
}

/// Ledger client speaking Ethereum JSON-RPC over HTTP.
pub struct RpcLedger {
    client: reqwest::Client,
    url: String,
    contract: String,
    sender: String,
    chain_id: u64,
    confirmations: u64,
    confirmation_timeout: Duration,
    poll_interval: Duration,
    circuit: CircuitBreaker,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl RpcLedger {
    /// Open a client with the `startup` retry preset for the initial probe.
    pub async fn connect(config: &IntegrityConfig) -> Result<Self, LedgerError> {
        Self::connect_with(config, &RetryConfig::startup(), CircuitConfig::default()).await
    }

    /// Open a client: build the HTTP client, probe `eth_chainId` and resolve
    /// the sending account.
    #[tracing::instrument(skip_all, fields(url = config.rpc_url.as_deref().unwrap_or("")))]
    pub async fn connect_with(
        config: &IntegrityConfig,
        retry_config: &RetryConfig,
        circuit_config: CircuitConfig,
    ) -> Result<Self, LedgerError> {
        let url = config
            .rpc_url
            .clone()
            .ok_or_else(|| LedgerError::Config("rpc_url is not set".into()))?;
        let contract = config
            .contract_address
            .clone()
            .ok_or_else(|| LedgerError::Config("contract_address is not set".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.rpc_request_timeout_ms))
            .build()
            .map_err(|e| LedgerError::Config(format!("failed to build HTTP client: {}", e)))?;

        let mut ledger = Self {
            client,
            url,
            contract,
            sender: String::new(),
            chain_id: 0,
            confirmations: config.confirmations.max(1),
            confirmation_timeout: Duration::from_millis(config.confirmation_timeout_ms),
            poll_interval: Duration::from_millis(config.receipt_poll_ms.max(1)),
            circuit: CircuitBreaker::new("ledger_rpc", circuit_config),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        };

        let chain_id = retry("ledger_connect", retry_config, || {
            ledger.request("eth_chainId", json!([]))
        })
        .await
        .map_err(|e| {
            metrics::set_backend_healthy("ledger", false);
            LedgerError::Read(format!("ledger node unreachable: {}", e))
        })?;
        ledger.chain_id = chain_id
            .as_str()
            .ok_or_else(|| LedgerError::Decode("eth_chainId returned a non-string".into()))
            .and_then(abi::parse_quantity)?;

        ledger.sender = match &config.sender_address {
            Some(sender) => sender.clone(),
            None => {
                let accounts = ledger
                    .request("eth_accounts", json!([]))
                    .await
                    .map_err(RpcFailure::into_read)?;
                accounts
                    .get(0)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| LedgerError::Config("no sender_address and node manages no accounts".into()))?
            }
        };

        metrics::set_backend_healthy("ledger", true);
        info!(
            chain_id = ledger.chain_id,
            contract = %ledger.contract,
            sender = %ledger.sender,
            "Ledger client connected"
        );
        Ok(ledger)
    }

    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcFailure::Closed);
        }

        let body = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .circuit
            .call(|| async {
                self.client
                    .post(&self.url)
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<RpcResponse>()
                    .await
            })
            .await
            .map_err(|e| match e {
                CircuitError::Rejected => RpcFailure::Rejected,
                CircuitError::Inner(e) => RpcFailure::Transport(e.to_string()),
            })?;

        if let Some(error) = response.error {
            return Err(RpcFailure::Node {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// One poll that tolerates transport trouble: the transaction is already
    /// broadcast, so a failed poll is retried until the confirmation timeout
    /// instead of failing the write. Only a closed client stops the wait.
    async fn poll(&self, tx_hash: &str, method: &str, params: Value) -> Result<Option<Value>, LedgerError> {
        match self.request(method, params).await {
            Ok(value) => Ok(Some(value)),
            Err(RpcFailure::Closed) => Err(LedgerError::Unavailable),
            Err(e) => {
                debug!(tx_hash, method, error = %e, "Confirmation poll failed, polling again");
                metrics::record_ledger_operation(BACKEND, "poll", "error");
                Ok(None)
            }
        }
    }

    /// Poll for the receipt until it has enough confirmations.
    /// Returns the block the transaction was mined in.
    async fn await_confirmation(&self, tx_hash: &str) -> Result<u64, LedgerError> {
        loop {
            let Some(receipt) = self
                .poll(tx_hash, "eth_getTransactionReceipt", json!([tx_hash]))
                .await?
            else {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            };

            if !receipt.is_null() {
                // pre-byzantium receipts carry no status
                let status = receipt
                    .get("status")
                    .and_then(Value::as_str)
                    .map(abi::parse_quantity)
                    .transpose()?;
                if status == Some(0) {
                    return Err(LedgerError::Reverted {
                        tx_hash: tx_hash.to_string(),
                    });
                }

                let mined_in = receipt
                    .get("blockNumber")
                    .and_then(Value::as_str)
                    .map(abi::parse_quantity)
                    .transpose()?;

                if let Some(block) = mined_in {
                    if self.confirmations <= 1 {
                        return Ok(block);
                    }
                    if let Some(head) = self.poll(tx_hash, "eth_blockNumber", json!([])).await? {
                        let head = head
                            .as_str()
                            .ok_or_else(|| LedgerError::Decode("eth_blockNumber returned a non-string".into()))
                            .and_then(abi::parse_quantity)?;
                        if head + 1 >= block + self.confirmations {
                            return Ok(block);
                        }
                        debug!(tx_hash, block, head, "Waiting for more confirmations");
                    }
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    #[tracing::instrument(skip(self, hashes), fields(tx_hash))]
    async fn upsert(&self, patient_id: PatientId, hashes: &SectionHashes) -> Result<TxReceipt, LedgerError> {
        let _timer = LatencyTimer::new(BACKEND, "upsert");

        let transaction = json!({
            "from": self.sender,
            "to": self.contract,
            "data": abi::to_hex_data(&abi::encode_store(patient_id, hashes)),
        });

        let submitted = self
            .request("eth_sendTransaction", json!([transaction]))
            .await
            .map_err(|e| {
                warn!(error = %e, "Transaction submission failed");
                metrics::record_ledger_operation(BACKEND, "upsert", "error");
                e.into_write()
            })?;
        let tx_hash = submitted
            .as_str()
            .ok_or_else(|| LedgerError::Decode("eth_sendTransaction returned a non-string".into()))?
            .to_string();
        tracing::Span::current().record("tx_hash", tx_hash.as_str());
        debug!("Transaction submitted, awaiting confirmation");

        match tokio::time::timeout(self.confirmation_timeout, self.await_confirmation(&tx_hash)).await {
            Ok(Ok(block)) => {
                metrics::record_ledger_operation(BACKEND, "upsert", "success");
                info!(block, "Patient hashes anchored");
                Ok(TxReceipt {
                    tx_hash,
                    block_number: Some(block),
                })
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Transaction failed");
                metrics::record_ledger_operation(BACKEND, "upsert", "error");
                Err(e)
            }
            Err(_) => {
                let waited_ms = self.confirmation_timeout.as_millis() as u64;
                warn!(waited_ms, "Transaction unconfirmed before timeout");
                metrics::record_confirmation_timeout();
                metrics::record_ledger_operation(BACKEND, "upsert", "timeout");
                Err(LedgerError::ConfirmationTimeout { tx_hash, waited_ms })
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn fetch(&self, patient_id: PatientId) -> Result<LedgerEntry, LedgerError> {
        let _timer = LatencyTimer::new(BACKEND, "fetch");

        let call = json!({
            "to": self.contract,
            "data": abi::to_hex_data(&abi::encode_get(patient_id)),
        });

        let output = match self.request("eth_call", json!([call, "latest"])).await {
            Ok(output) => output,
            // getPatientData only reverts on its existence guard
            Err(e) if e.is_revert() => {
                metrics::record_ledger_operation(BACKEND, "fetch", "not_found");
                return Err(LedgerError::NotFound(patient_id));
            }
            Err(e) => {
                metrics::record_ledger_operation(BACKEND, "fetch", "error");
                return Err(e.into_read());
            }
        };

        let text = output
            .as_str()
            .ok_or_else(|| LedgerError::Decode("eth_call returned a non-string".into()))?;
        let result = abi::decode_entry(patient_id, &abi::from_hex_data(text)?);
        let status = match &result {
            Ok(_) => "success",
            Err(LedgerError::NotFound(_)) => "not_found",
            Err(_) => "error",
        };
        metrics::record_ledger_operation(BACKEND, "fetch", status);
        result
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        info!("Ledger client closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_mapping() {
        assert!(matches!(RpcFailure::Rejected.into_write(), LedgerError::Unavailable));
        assert!(matches!(RpcFailure::Closed.into_read(), LedgerError::Unavailable));
        assert!(matches!(
            RpcFailure::Transport("reset".into()).into_write(),
            LedgerError::Write(_)
        ));
        assert!(matches!(
            RpcFailure::Node { code: -32000, message: "nonce too low".into() }.into_read(),
            LedgerError::Read(_)
        ));
    }

    #[test]
    fn test_revert_detection() {
        assert!(RpcFailure::Node { code: 3, message: "execution reverted".into() }.is_revert());
        assert!(RpcFailure::Node {
            code: -32603,
            message: "Error: VM Exception while processing transaction: reverted with reason string 'Patient not found'".into()
        }
        .is_revert());
        assert!(!RpcFailure::Node { code: -32000, message: "header not found".into() }.is_revert());
        assert!(!RpcFailure::Transport("timeout".into()).is_revert());
    }

    #[tokio::test]
    async fn test_connect_requires_rpc_url() {
        let config = IntegrityConfig::default();
        let result = RpcLedger::connect_with(&config, &RetryConfig::once(), CircuitConfig::test()).await;
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[tokio::test]
    async fn test_connect_requires_contract_address() {
        let config = IntegrityConfig {
            rpc_url: Some("http://127.0.0.1:1".into()),
            ..Default::default()
        };
        let result = RpcLedger::connect_with(&config, &RetryConfig::once(), CircuitConfig::test()).await;
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }

    #[tokio::test]
    async fn test_connect_unreachable_node() {
        let config = IntegrityConfig {
            rpc_url: Some("http://127.0.0.1:1".into()),
            contract_address: Some("0x0000000000000000000000000000000000000001".into()),
            rpc_request_timeout_ms: 200,
            ..Default::default()
        };
        let result = RpcLedger::connect_with(&config, &RetryConfig::once(), CircuitConfig::test()).await;
        assert!(matches!(result, Err(LedgerError::Read(_))));
    }
}
