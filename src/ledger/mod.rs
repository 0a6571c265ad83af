// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Ledger client abstraction.
//!
//! The ledger is an external contract holding one [`LedgerEntry`] per patient:
//! six section digests plus the block timestamp of the last write.
//!
//! ```text
//! storePatientData(id, h1..h6)          getPatientData(id)
//!          │                                    │
//!          ▼                                    ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  patientId → (h1..h6, timestamp)     (last writer wins)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Create and update are the same write: [`Ledger::upsert`] replaces all six
//! digests at once. There is no existence check before a write.
//!
//! # Absence
//!
//! The contract answers unknown ids with a zero-filled tuple. A written entry
//! always carries a non-zero block timestamp, so `timestamp == 0` is reported
//! as [`LedgerError::NotFound`]. Zero digests alone are never treated as
//! absence.

pub mod abi;
mod memory;
mod rpc;

pub use memory::InMemoryLedger;
pub use rpc::RpcLedger;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hasher::SectionHashes;
use crate::record::PatientId;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger write failed: {0}")]
    Write(String),
    #[error("ledger read failed: {0}")]
    Read(String),
    #[error("no ledger entry for patient {0}")]
    NotFound(PatientId),
    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },
    #[error("transaction {tx_hash} unconfirmed after {waited_ms}ms")]
    ConfirmationTimeout { tx_hash: String, waited_ms: u64 },
    #[error("ledger unavailable (circuit open)")]
    Unavailable,
    #[error("malformed ledger response: {0}")]
    Decode(String),
    #[error("ledger misconfigured: {0}")]
    Config(String),
}

impl LedgerError {
    /// Whether a caller may reasonably retry the same operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Write(_) | Self::Read(_) | Self::ConfirmationTimeout { .. } | Self::Unavailable
        )
    }
}

/// The on-ledger record for one patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub patient_id: PatientId,
    #[serde(flatten)]
    pub hashes: SectionHashes,
    /// Unix seconds of the block that last wrote this entry.
    pub timestamp: u64,
}

/// Identifier of a confirmed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub tx_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Write all six digests for `patient_id`, blocking until confirmed.
    async fn upsert(&self, patient_id: PatientId, hashes: &SectionHashes) -> Result<TxReceipt, LedgerError>;

    /// Read the current entry for `patient_id`.
    async fn fetch(&self, patient_id: PatientId) -> Result<LedgerEntry, LedgerError>;

    /// First write for a patient. Same path as [`update`](Self::update).
    async fn store(&self, patient_id: PatientId, hashes: &SectionHashes) -> Result<TxReceipt, LedgerError> {
        self.upsert(patient_id, hashes).await
    }

    /// Overwrite an existing entry. Same path as [`store`](Self::store).
    async fn update(&self, patient_id: PatientId, hashes: &SectionHashes) -> Result<TxReceipt, LedgerError> {
        self.upsert(patient_id, hashes).await
    }

    /// Release connections. Default is a no-op.
    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Digest;
    use serde_json::json;

    #[test]
    fn test_retryable_classification() {
        assert!(LedgerError::ConfirmationTimeout { tx_hash: "0x1".into(), waited_ms: 10 }.is_retryable());
        assert!(LedgerError::Unavailable.is_retryable());
        assert!(LedgerError::Write("connection reset".into()).is_retryable());
        assert!(!LedgerError::Reverted { tx_hash: "0x1".into() }.is_retryable());
        assert!(!LedgerError::NotFound(7).is_retryable());
        assert!(!LedgerError::Decode("short".into()).is_retryable());
    }

    #[test]
    fn test_entry_serializes_flat_like_contract_tuple() {
        let entry = LedgerEntry {
            patient_id: 12345,
            hashes: SectionHashes::from_array([Digest([0xab; 32]); 6]),
            timestamp: 1_700_000_000,
        };
        let value = serde_json::to_value(entry).unwrap();

        assert_eq!(value["patientId"], json!(12345));
        assert_eq!(value["timestamp"], json!(1_700_000_000u64));
        assert_eq!(value["cognitiveHealthHash"], json!(format!("0x{}", "ab".repeat(32))));
    }

    #[tokio::test]
    async fn test_store_and_update_share_upsert_path() {
        let ledger = InMemoryLedger::new();
        let first = SectionHashes::from_array([Digest([1; 32]); 6]);
        let second = SectionHashes::from_array([Digest([2; 32]); 6]);

        ledger.store(1, &first).await.unwrap();
        ledger.update(1, &second).await.unwrap();

        assert_eq!(ledger.fetch(1).await.unwrap().hashes, second);
        // update without a prior store is accepted
        ledger.update(2, &first).await.unwrap();
        assert_eq!(ledger.fetch(2).await.unwrap().hashes, first);
    }
}
