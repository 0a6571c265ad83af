// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis document store.
//!
//! Each patient document is one Redis STRING holding its JSON text, keyed by
//! `{prefix}{patientId}`:
//!
//! ```text
//! SET patient:12345 '{"demographics":{"age":45},"medicalHistory":{...}}'
//! ```
//!
//! Individual commands use the `query` retry preset; connecting uses
//! `startup` unless the caller passes its own preset.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde_json::Value;

use super::traits::{DocumentStore, StorageError};
use crate::metrics;
use crate::record::PatientId;
use crate::resilience::retry::{retry, RetryConfig};

const BACKEND: &str = "redis";

const RECONNECT_EXPONENT_BASE: u64 = 2;
const RECONNECT_FACTOR_MS: u64 = 100;
/// Retries inside the connection manager. Zero so the caller's preset alone
/// decides how long the initial connect waits.
const RECONNECT_RETRIES: usize = 0;

pub struct RedisDocumentStore {
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "patient:" → "patient:12345")
    prefix: String,
}

impl RedisDocumentStore {
    /// Create a new Redis store without a key prefix.
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::with_prefix(connection_string, None).await
    }

    /// Create a new Redis store with an optional key prefix.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use patient_integrity::storage::RedisDocumentStore;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// // Keys will be prefixed: "patient:12345"
    /// let store = RedisDocumentStore::with_prefix("redis://localhost", Some("patient:")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_prefix(connection_string: &str, prefix: Option<&str>) -> Result<Self, StorageError> {
        Self::with_prefix_and_retry(connection_string, prefix, &RetryConfig::startup()).await
    }

    /// Create a new Redis store, retrying the initial connect per `retry_config`.
    ///
    /// `RetryConfig::daemon()` waits for Redis indefinitely.
    pub async fn with_prefix_and_retry(
        connection_string: &str,
        prefix: Option<&str>,
        retry_config: &RetryConfig,
    ) -> Result<Self, StorageError> {
        let client = Client::open(connection_string)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        // One attempt per retry round; reconnect backoff stays at the redis defaults.
        let connection = retry("redis_connect", retry_config, || async {
            ConnectionManager::new_with_backoff(
                client.clone(),
                RECONNECT_EXPONENT_BASE,
                RECONNECT_FACTOR_MS,
                RECONNECT_RETRIES,
            )
            .await
        })
        .await
        .map_err(|e: redis::RedisError| {
            metrics::set_backend_healthy(BACKEND, false);
            StorageError::Backend(e.to_string())
        })?;

        metrics::set_backend_healthy(BACKEND, true);
        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
        })
    }

    #[inline]
    fn key(&self, id: PatientId) -> String {
        format!("{}{}", self.prefix, id)
    }

    /// Get the configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn record(operation: &str, ok: bool) {
        metrics::record_document_operation(BACKEND, operation, if ok { "success" } else { "error" });
    }
}

#[async_trait]
impl DocumentStore for RedisDocumentStore {
    async fn get(&self, id: PatientId) -> Result<Option<Value>, StorageError> {
        let conn = self.connection.clone();
        let key = self.key(id);

        let data: Option<String> = retry("redis_get", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let data: Option<String> = conn.get(&key).await?;
                Ok(data)
            }
        })
        .await
        .map_err(|e: redis::RedisError| {
            Self::record("get", false);
            StorageError::Backend(e.to_string())
        })?;
        Self::record("get", true);

        data.map(|text| {
            serde_json::from_str(&text).map_err(|e| StorageError::Serialization {
                id,
                reason: e.to_string(),
            })
        })
        .transpose()
    }

    async fn put(&self, id: PatientId, document: &Value) -> Result<(), StorageError> {
        let conn = self.connection.clone();
        let key = self.key(id);
        let text = document.to_string();

        let result = retry("redis_set", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            let text = text.clone();
            async move {
                let _: () = conn.set(&key, &text).await?;
                Ok(())
            }
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()));
        Self::record("put", result.is_ok());
        result
    }

    async fn delete(&self, id: PatientId) -> Result<(), StorageError> {
        let conn = self.connection.clone();
        let key = self.key(id);

        let result = retry("redis_delete", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let _: () = conn.del(&key).await?;
                Ok(())
            }
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()));
        Self::record("delete", result.is_ok());
        result
    }

    async fn exists(&self, id: PatientId) -> Result<bool, StorageError> {
        let conn = self.connection.clone();
        let key = self.key(id);

        retry("redis_exists", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let exists: bool = conn.exists(&key).await?;
                Ok(exists)
            }
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        let result: Result<String, redis::RedisError> = redis::cmd("PING").query_async(&mut conn).await;
        let healthy = result.is_ok();
        metrics::set_backend_healthy(BACKEND, healthy);
        result.map(|_| ()).map_err(|e| StorageError::Backend(e.to_string()))
    }
}
