// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::record::PatientId;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Document not found")]
    NotFound,
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Stored document for patient {id} is not valid JSON: {reason}")]
    Serialization { id: PatientId, reason: String },
}

/// Store of record for full patient documents.
///
/// The ledger only holds digests; the document a digest was computed from
/// lives here. Writes replace the whole document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: PatientId) -> Result<Option<Value>, StorageError>;
    async fn put(&self, id: PatientId, document: &Value) -> Result<(), StorageError>;
    async fn delete(&self, id: PatientId) -> Result<(), StorageError>;

    /// Default implementation falls back to a full `get`.
    async fn exists(&self, id: PatientId) -> Result<bool, StorageError> {
        Ok(self.get(id).await?.is_some())
    }

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
