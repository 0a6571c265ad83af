// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Anchoring records on the ledger.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::error::IntegrityError;
use crate::hasher::{hash_record, SectionHashes};
use crate::ledger::Ledger;
use crate::record::{PatientId, PatientRecord};

/// Result of a successful anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreReceipt {
    pub tx_hash: String,
    pub hashes: SectionHashes,
}

#[derive(Clone)]
pub struct StoreService {
    ledger: Arc<dyn Ledger>,
}

impl StoreService {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Hash all six sections and write them in one transaction.
    ///
    /// Single attempt: a failed or unconfirmed write is returned to the
    /// caller, never retried here.
    #[tracing::instrument(skip(self, record))]
    pub async fn store_or_update(
        &self,
        patient_id: PatientId,
        record: &PatientRecord,
    ) -> Result<StoreReceipt, IntegrityError> {
        let hashes = hash_record(record)?;

        match self.ledger.upsert(patient_id, &hashes).await {
            Ok(receipt) => {
                info!(tx_hash = %receipt.tx_hash, "Record anchored");
                Ok(StoreReceipt {
                    tx_hash: receipt.tx_hash,
                    hashes,
                })
            }
            Err(e) => {
                error!(error = %e, retryable = e.is_retryable(), "Failed to anchor record");
                Err(IntegrityError::ledger_write(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash_section;
    use crate::ledger::{InMemoryLedger, LedgerError};
    use serde_json::json;

    #[tokio::test]
    async fn test_store_anchors_section_hashes() {
        let ledger = Arc::new(InMemoryLedger::new());
        let service = StoreService::new(ledger.clone());
        let record: PatientRecord = serde_json::from_value(json!({
            "demographics": {"age": 45},
            "medicalHistory": {"dx": "ALS"}
        }))
        .unwrap();

        let receipt = service.store_or_update(12345, &record).await.unwrap();

        assert!(receipt.tx_hash.starts_with("0x"));
        let entry = ledger.fetch(12345).await.unwrap();
        assert_eq!(entry.hashes, receipt.hashes);
        assert_eq!(entry.hashes.demographics_hash, hash_section(&json!({"age": 45})).unwrap());
    }

    #[tokio::test]
    async fn test_outage_surfaces_ledger_write_error() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.set_available(false);
        let service = StoreService::new(ledger.clone());

        let err = service.store_or_update(1, &PatientRecord::default()).await.unwrap_err();

        assert!(matches!(err, IntegrityError::LedgerWrite(LedgerError::Write(_))));
        ledger.set_available(true);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_second_write_replaces_all_hashes() {
        let ledger = Arc::new(InMemoryLedger::new());
        let service = StoreService::new(ledger.clone());

        let first = service.store_or_update(5, &PatientRecord::default()).await.unwrap();
        let mut changed = PatientRecord::default();
        changed.cognitive_health.insert("ecas".into(), json!(100));
        let second = service.store_or_update(5, &changed).await.unwrap();

        assert_ne!(first.tx_hash, second.tx_hash);
        assert_eq!(ledger.fetch(5).await.unwrap().hashes, second.hashes);
        assert_eq!(ledger.len(), 1);
    }
}
