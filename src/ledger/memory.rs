// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::hasher::{keccak256, SectionHashes};
use crate::metrics;
use crate::record::PatientId;

use super::{Ledger, LedgerEntry, LedgerError, TxReceipt};

/// In-process ledger for tests and local development.
///
/// Each write replaces the whole entry in one map insert, so readers never
/// observe a mix of two writes.
pub struct InMemoryLedger {
    entries: DashMap<PatientId, LedgerEntry>,
    nonce: AtomicU64,
    available: AtomicBool,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            nonce: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the ledger going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of patients with an entry
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .max(1)
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn upsert(&self, patient_id: PatientId, hashes: &SectionHashes) -> Result<TxReceipt, LedgerError> {
        if !self.is_available() {
            metrics::record_ledger_operation("memory", "upsert", "error");
            return Err(LedgerError::Write("in-memory ledger offline".into()));
        }

        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst) + 1;
        let mut preimage = Vec::with_capacity(16);
        preimage.extend_from_slice(&patient_id.to_be_bytes());
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let tx_hash = format!("0x{}", hex::encode(keccak256(&preimage)));

        self.entries.insert(
            patient_id,
            LedgerEntry {
                patient_id,
                hashes: *hashes,
                timestamp: unix_seconds(),
            },
        );

        metrics::record_ledger_operation("memory", "upsert", "success");
        Ok(TxReceipt {
            tx_hash,
            block_number: Some(nonce),
        })
    }

    async fn fetch(&self, patient_id: PatientId) -> Result<LedgerEntry, LedgerError> {
        if !self.is_available() {
            metrics::record_ledger_operation("memory", "fetch", "error");
            return Err(LedgerError::Read("in-memory ledger offline".into()));
        }
        let entry = self.entries.get(&patient_id).map(|r| *r.value());
        metrics::record_ledger_operation("memory", "fetch", if entry.is_some() { "success" } else { "not_found" });
        entry.ok_or(LedgerError::NotFound(patient_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Digest;
    use std::sync::Arc;

    fn hashes(fill: u8) -> SectionHashes {
        SectionHashes::from_array([Digest([fill; 32]); 6])
    }

    #[tokio::test]
    async fn test_new_ledger_is_empty() {
        let ledger = InMemoryLedger::new();
        assert!(ledger.is_empty());
        assert!(matches!(ledger.fetch(1).await, Err(LedgerError::NotFound(1))));
    }

    #[tokio::test]
    async fn test_upsert_then_fetch() {
        let ledger = InMemoryLedger::new();
        let receipt = ledger.upsert(12345, &hashes(7)).await.unwrap();

        assert!(receipt.tx_hash.starts_with("0x"));
        assert_eq!(receipt.tx_hash.len(), 66);

        let entry = ledger.fetch(12345).await.unwrap();
        assert_eq!(entry.patient_id, 12345);
        assert_eq!(entry.hashes, hashes(7));
        assert!(entry.timestamp > 0);
    }

    #[tokio::test]
    async fn test_tx_hashes_are_unique() {
        let ledger = InMemoryLedger::new();
        let a = ledger.upsert(1, &hashes(1)).await.unwrap();
        let b = ledger.upsert(1, &hashes(1)).await.unwrap();
        assert_ne!(a.tx_hash, b.tx_hash);
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let ledger = InMemoryLedger::new();
        ledger.upsert(9, &hashes(1)).await.unwrap();
        ledger.upsert(9, &hashes(2)).await.unwrap();

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.fetch(9).await.unwrap().hashes, hashes(2));
    }

    #[tokio::test]
    async fn test_offline_ledger_fails_reads_and_writes() {
        let ledger = InMemoryLedger::new();
        ledger.upsert(1, &hashes(1)).await.unwrap();
        ledger.set_available(false);

        assert!(matches!(ledger.upsert(1, &hashes(2)).await, Err(LedgerError::Write(_))));
        assert!(matches!(ledger.fetch(1).await, Err(LedgerError::Read(_))));

        ledger.set_available(true);
        assert_eq!(ledger.fetch(1).await.unwrap().hashes, hashes(1));
    }

    #[tokio::test]
    async fn test_concurrent_writers_never_mix_entries() {
        let ledger = Arc::new(InMemoryLedger::new());
        let mut handles = vec![];

        for fill in 1..=16u8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    ledger.upsert(42, &hashes(fill)).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let entry = ledger.fetch(42).await.unwrap();
        let first = entry.hashes.demographics_hash;
        assert!(entry.hashes.to_array().iter().all(|d| *d == first));
    }
}
