// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::traits::{DocumentStore, StorageError};
use crate::record::PatientId;

pub struct InMemoryDocumentStore {
    data: DashMap<PatientId, Value>,
    available: AtomicBool,
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate a backend outage: every call fails with `Backend` while unset.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Get current document count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::Backend("in-memory store offline".into()))
        }
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, id: PatientId) -> Result<Option<Value>, StorageError> {
        self.check_available()?;
        Ok(self.data.get(&id).map(|r| r.value().clone()))
    }

    async fn put(&self, id: PatientId, document: &Value) -> Result<(), StorageError> {
        self.check_available()?;
        self.data.insert(id, document.clone());
        Ok(())
    }

    async fn delete(&self, id: PatientId) -> Result<(), StorageError> {
        self.check_available()?;
        self.data.remove(&id);
        Ok(())
    }

    async fn exists(&self, id: PatientId) -> Result<bool, StorageError> {
        self.check_available()?;
        Ok(self.data.contains_key(&id))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryDocumentStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryDocumentStore::new();
        let doc = json!({"demographics": {"age": 45}});

        store.put(12345, &doc).await.unwrap();

        assert_eq!(store.get(12345).await.unwrap(), Some(doc));
        assert!(store.exists(12345).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let store = InMemoryDocumentStore::new();
        assert!(store.get(1).await.unwrap().is_none());
        assert!(!store.exists(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_replaces_whole_document() {
        let store = InMemoryDocumentStore::new();
        store.put(1, &json!({"demographics": {"age": 45}, "notes": "x"})).await.unwrap();
        store.put(1, &json!({"demographics": {"age": 46}})).await.unwrap();

        assert_eq!(store.get(1).await.unwrap(), Some(json!({"demographics": {"age": 46}})));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryDocumentStore::new();
        store.put(7, &json!({})).await.unwrap();

        store.delete(7).await.unwrap();
        assert!(store.get(7).await.unwrap().is_none());
        // deleting again is fine
        assert!(store.delete(7).await.is_ok());
    }

    #[tokio::test]
    async fn test_outage_fails_every_call() {
        let store = InMemoryDocumentStore::new();
        store.put(1, &json!({})).await.unwrap();
        store.set_available(false);

        assert!(matches!(store.get(1).await, Err(StorageError::Backend(_))));
        assert!(matches!(store.put(2, &json!({})).await, Err(StorageError::Backend(_))));
        assert!(store.ping().await.is_err());

        store.set_available(true);
        assert!(store.get(1).await.unwrap().is_some());
    }
}
