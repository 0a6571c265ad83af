// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the integrity service.
//!
//! # Example
//!
//! ```
//! use patient_integrity::IntegrityConfig;
//!
//! // Minimal config: in-memory ledger and documents
//! let config = IntegrityConfig::default();
//! assert_eq!(config.confirmations, 1);
//! assert!(config.rpc_url.is_none());
//!
//! // Against a local node
//! let config = IntegrityConfig {
//!     rpc_url: Some("http://127.0.0.1:8545".into()),
//!     contract_address: Some("0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512".into()),
//!     redis_url: Some("redis://localhost:6379".into()),
//!     confirmation_timeout_ms: 30_000,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

/// Configuration for the integrity service.
///
/// All fields have defaults. Without `rpc_url` the service anchors into an
/// in-process ledger; without `redis_url` documents live in memory.
#[derive(Debug, Clone, Deserialize)]
pub struct IntegrityConfig {
    /// Ethereum JSON-RPC endpoint (e.g., "http://127.0.0.1:8545")
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Address of the patient data contract
    #[serde(default)]
    pub contract_address: Option<String>,

    /// Account that sends write transactions. When unset, the node's first
    /// managed account (`eth_accounts[0]`) is used.
    #[serde(default)]
    pub sender_address: Option<String>,

    /// Confirmations to wait for after a write is mined
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,

    /// Upper bound on the wait for confirmations
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,

    /// Receipt polling interval
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,

    /// Per-request HTTP timeout for RPC calls
    #[serde(default = "default_rpc_request_timeout_ms")]
    pub rpc_request_timeout_ms: u64,

    /// Redis connection string for the document store
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Redis key prefix for patient documents
    #[serde(default = "default_redis_prefix")]
    pub redis_prefix: Option<String>,

    /// HTTP listen address for the daemon
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_confirmations() -> u64 { 1 }
fn default_confirmation_timeout_ms() -> u64 { 60_000 }
fn default_receipt_poll_ms() -> u64 { 500 }
fn default_rpc_request_timeout_ms() -> u64 { 10_000 }
fn default_redis_prefix() -> Option<String> { Some("patient:".to_string()) }
fn default_listen_addr() -> String { "127.0.0.1:3001".to_string() }

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            contract_address: None,
            sender_address: None,
            confirmations: default_confirmations(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
            receipt_poll_ms: default_receipt_poll_ms(),
            rpc_request_timeout_ms: default_rpc_request_timeout_ms(),
            redis_url: None,
            redis_prefix: default_redis_prefix(),
            listen_addr: default_listen_addr(),
        }
    }
}
