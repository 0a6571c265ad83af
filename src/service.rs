// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Integrity service: owns the ledger, the document store, the store service
//! and the verifier behind one explicit lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//! Created → Connecting → Ready → ShuttingDown
//! ```
//!
//! Operations other than [`IntegrityService::health`] fail with
//! [`IntegrityError::NotReady`] outside `Ready`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use patient_integrity::{IntegrityService, ServiceState};
//! use patient_integrity::ledger::InMemoryLedger;
//! use patient_integrity::storage::InMemoryDocumentStore;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let service = IntegrityService::new(
//!     Arc::new(InMemoryLedger::new()),
//!     Arc::new(InMemoryDocumentStore::new()),
//! );
//! assert_eq!(service.state(), ServiceState::Ready);
//!
//! let receipt = service
//!     .submit(12345, json!({"demographics": {"age": 45}}))
//!     .await
//!     .unwrap();
//! assert!(receipt.tx_hash.starts_with("0x"));
//!
//! let verification = service.verify(12345, None).await.unwrap();
//! assert!(verification.is_verified());
//! # }
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::advice::{generate_advice, CaregiverAdvice};
use crate::assessment::{build_document, frequency_analysis, visualization, FrequencyAnalysis, Visualization};
use crate::config::IntegrityConfig;
use crate::error::IntegrityError;
use crate::ledger::{InMemoryLedger, Ledger, LedgerError, RpcLedger};
use crate::metrics;
use crate::record::{PatientId, PatientRecord};
use crate::resilience::circuit_breaker::CircuitConfig;
use crate::resilience::retry::RetryConfig;
use crate::storage::{DocumentStore, InMemoryDocumentStore, RedisDocumentStore};
use crate::store::{StoreReceipt, StoreService};
use crate::verifier::{IndeterminateCause, IntegrityVerifier, Verification};

/// Service lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Just created, not yet connected
    Created,
    /// Connecting to the ledger and the document store
    Connecting,
    /// Accepting requests
    Ready,
    /// Graceful shutdown in progress
    ShuttingDown,
}

impl ServiceState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Connecting => "Connecting",
            Self::Ready => "Ready",
            Self::ShuttingDown => "ShuttingDown",
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health snapshot for load balancers and the `/health` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub state: String,
    pub ledger_reachable: bool,
    pub documents_reachable: bool,
    /// Ready and both backends reachable
    pub healthy: bool,
}

pub struct IntegrityService {
    state: watch::Sender<ServiceState>,
    state_rx: watch::Receiver<ServiceState>,
    ledger: Arc<dyn Ledger>,
    documents: Arc<dyn DocumentStore>,
    store: StoreService,
    verifier: IntegrityVerifier,
}

impl IntegrityService {
    /// Build a service around already-open collaborators. Starts `Ready`.
    pub fn new(ledger: Arc<dyn Ledger>, documents: Arc<dyn DocumentStore>) -> Self {
        let (state, state_rx) = watch::channel(ServiceState::Created);
        let service = Self::assemble(state, state_rx, ledger, documents);
        service.set_state(ServiceState::Ready);
        service
    }

    /// Connect the backends named in `config` with the `startup` retry preset.
    pub async fn open(config: &IntegrityConfig) -> Result<Self, IntegrityError> {
        Self::open_with(config, &RetryConfig::startup()).await
    }

    /// Connect the backends named in `config`.
    ///
    /// `RpcLedger` when `rpc_url` is set, else an in-process ledger.
    /// Redis documents when `redis_url` is set, else in-memory documents.
    #[tracing::instrument(skip_all, fields(has_rpc, has_redis))]
    pub async fn open_with(config: &IntegrityConfig, retry_config: &RetryConfig) -> Result<Self, IntegrityError> {
        let (state, state_rx) = watch::channel(ServiceState::Created);
        let _ = state.send(ServiceState::Connecting);
        metrics::set_service_state(ServiceState::Connecting.as_str());
        info!("Opening integrity service...");

        let ledger: Arc<dyn Ledger> = if config.rpc_url.is_some() {
            tracing::Span::current().record("has_rpc", true);
            let ledger = RpcLedger::connect_with(config, retry_config, CircuitConfig::default())
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to connect to ledger node");
                    IntegrityError::ledger_read(e)
                })?;
            Arc::new(ledger)
        } else {
            tracing::Span::current().record("has_rpc", false);
            warn!("No rpc_url configured - anchoring into an in-process ledger");
            Arc::new(InMemoryLedger::new())
        };

        let documents: Arc<dyn DocumentStore> = match &config.redis_url {
            Some(redis_url) => {
                tracing::Span::current().record("has_redis", true);
                info!(url = %redis_url, prefix = ?config.redis_prefix, "Connecting to Redis document store...");
                match RedisDocumentStore::with_prefix_and_retry(redis_url, config.redis_prefix.as_deref(), retry_config).await {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        error!(error = %e, "Failed to connect to Redis");
                        ledger.close().await;
                        return Err(e.into());
                    }
                }
            }
            None => {
                tracing::Span::current().record("has_redis", false);
                warn!("No redis_url configured - documents are kept in memory");
                Arc::new(InMemoryDocumentStore::new())
            }
        };

        let service = Self::assemble(state, state_rx, ledger, documents);
        service.set_state(ServiceState::Ready);
        info!("Integrity service ready");
        Ok(service)
    }

    fn assemble(
        state: watch::Sender<ServiceState>,
        state_rx: watch::Receiver<ServiceState>,
        ledger: Arc<dyn Ledger>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            state,
            state_rx,
            store: StoreService::new(ledger.clone()),
            verifier: IntegrityVerifier::new(ledger.clone()),
            ledger,
            documents,
        }
    }

    fn set_state(&self, state: ServiceState) {
        let _ = self.state.send(state);
        metrics::set_service_state(state.as_str());
    }

    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state_rx.borrow()
    }

    /// Watch channel for state transitions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ServiceState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ServiceState::Ready
    }

    fn ensure_ready(&self) -> Result<(), IntegrityError> {
        match self.state() {
            ServiceState::Ready => Ok(()),
            other => Err(IntegrityError::NotReady(other.to_string())),
        }
    }

    /// Stop accepting requests and release the ledger client.
    pub async fn close(&self) {
        if self.state() == ServiceState::ShuttingDown {
            return;
        }
        self.set_state(ServiceState::ShuttingDown);
        info!("Shutting down integrity service");
        self.ledger.close().await;
    }

    /// Anchor a patient document on the ledger, then store it.
    ///
    /// The document is only written once the ledger write has confirmed, so
    /// any failure leaves the document store untouched.
    ///
    /// Both stores are last-writer-wins with no lock spanning the pair.
    /// Concurrent submits for one patient may land their ledger and document
    /// writes in different orders, and the stored document then verifies as
    /// `Mismatched` until the next submit. Callers that need a consistent pair
    /// must serialize submits per patient.
    #[tracing::instrument(skip(self, document))]
    pub async fn submit(&self, patient_id: PatientId, document: Value) -> Result<StoreReceipt, IntegrityError> {
        self.ensure_ready()?;

        if !document.is_object() {
            return Err(IntegrityError::InvalidRecord("patient data must be a JSON object".into()));
        }
        let record =
            PatientRecord::from_document(&document).map_err(|e| IntegrityError::InvalidRecord(e.to_string()))?;

        let receipt = self.store.store_or_update(patient_id, &record).await?;

        self.documents.put(patient_id, &document).await.map_err(|e| {
            error!(error = %e, tx_hash = %receipt.tx_hash, "Anchored but failed to store document");
            IntegrityError::from(e)
        })?;

        Ok(receipt)
    }

    /// Load the stored document for a patient.
    pub async fn document(&self, patient_id: PatientId) -> Result<Option<Value>, IntegrityError> {
        self.ensure_ready()?;
        Ok(self.documents.get(patient_id).await?)
    }

    /// Verify `record`, or the stored document when `record` is `None`.
    #[tracing::instrument(skip(self, record))]
    pub async fn verify(
        &self,
        patient_id: PatientId,
        record: Option<&PatientRecord>,
    ) -> Result<Verification, IntegrityError> {
        self.ensure_ready()?;

        if let Some(record) = record {
            return Ok(self.verifier.verify(patient_id, record).await);
        }

        let Some(document) = self.documents.get(patient_id).await? else {
            return Ok(Verification::Indeterminate(IndeterminateCause::NotAnchored));
        };
        match PatientRecord::from_document(&document) {
            Ok(stored) => Ok(self.verifier.verify(patient_id, &stored).await),
            Err(e) => Ok(Verification::Indeterminate(IndeterminateCause::Serialization(e.to_string()))),
        }
    }

    /// Fold a flat assessment form into a patient document, then `submit` it.
    /// Returns the receipt and the document that was anchored.
    #[tracing::instrument(skip(self, form))]
    pub async fn submit_assessment(
        &self,
        patient_id: PatientId,
        form: &Value,
    ) -> Result<(StoreReceipt, Value), IntegrityError> {
        self.ensure_ready()?;
        let document = build_document(form).map_err(|e| IntegrityError::InvalidRecord(e.to_string()))?;
        let receipt = self.submit(patient_id, document.clone()).await?;
        Ok((receipt, document))
    }

    /// Caregiver advice for a stored patient, `None` if no document exists.
    pub async fn advice(&self, patient_id: PatientId) -> Result<Option<CaregiverAdvice>, IntegrityError> {
        Ok(self.document(patient_id).await?.map(|doc| generate_advice(&doc)))
    }

    pub async fn frequency_analysis(&self, patient_id: PatientId) -> Result<Option<FrequencyAnalysis>, IntegrityError> {
        Ok(self.document(patient_id).await?.map(|doc| frequency_analysis(&doc)))
    }

    pub async fn visualization(&self, patient_id: PatientId) -> Result<Option<Visualization>, IntegrityError> {
        Ok(self.document(patient_id).await?.map(|doc| visualization(&doc)))
    }

    /// Probe both backends. Never fails; unreachable backends are reported.
    pub async fn health(&self) -> HealthCheck {
        let state = self.state();

        // id 0 is never written; NotFound proves the node answered
        let ledger_reachable = match self.ledger.fetch(0).await {
            Ok(_) | Err(LedgerError::NotFound(_)) => true,
            Err(e) => {
                warn!(error = %e, "Ledger health probe failed");
                false
            }
        };
        metrics::set_backend_healthy("ledger", ledger_reachable);

        let documents_reachable = match self.documents.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Document store health probe failed");
                false
            }
        };
        metrics::set_backend_healthy("documents", documents_reachable);

        HealthCheck {
            state: state.to_string(),
            ledger_reachable,
            documents_reachable,
            healthy: state == ServiceState::Ready && ledger_reachable && documents_reachable,
        }
    }
}
