// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Patient Integrity
//!
//! Anchors keccak-256 digests of patient assessment records on a ledger
//! contract and verifies records against them, one section at a time.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        HTTP (axum)                          │
//! │  • POST /patient-data, GET /patient-data/:id[/verify]       │
//! │  • assessment intake, advice, summaries, health             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     IntegrityService                        │
//! │  • Created → Connecting → Ready → ShuttingDown              │
//! │  • submit: anchor on ledger, then store document            │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                   │
//!            ▼                                   ▼
//! ┌──────────────────────────────┐  ┌──────────────────────────┐
//! │  StoreService / Verifier     │  │  DocumentStore           │
//! │  • hash six sections         │  │  • Redis or in-memory    │
//! │  • Ledger: JSON-RPC or memory│  │  • full documents        │
//! └──────────────────────────────┘  └──────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use patient_integrity::{IntegrityConfig, IntegrityService};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = IntegrityConfig {
//!         rpc_url: Some("http://127.0.0.1:8545".into()),
//!         contract_address: Some("0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512".into()),
//!         redis_url: Some("redis://localhost:6379".into()),
//!         ..Default::default()
//!     };
//!
//!     let service = IntegrityService::open(&config).await.expect("Failed to open");
//!
//!     let receipt = service
//!         .submit(12345, json!({"demographics": {"age": 45}, "medicalHistory": {"dx": "ALS"}}))
//!         .await
//!         .expect("Failed to submit");
//!     println!("anchored in {}", receipt.tx_hash);
//!
//!     let verification = service.verify(12345, None).await.unwrap();
//!     println!("{}", verification.status());
//!
//!     service.close().await;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`record`]: patient records and the six hashed sections
//! - [`hasher`]: canonical JSON and keccak-256 section digests
//! - [`ledger`]: ledger trait, JSON-RPC client, contract ABI
//! - [`verifier`]: section-wise verification
//! - [`store`]: anchoring records
//! - [`storage`]: document store backends (Redis, memory)
//! - [`service`]: the lifecycle-managed [`IntegrityService`]
//! - [`advice`]: caregiver advice from stored documents
//! - [`assessment`]: form intake, frequency analysis, visualization subsets
//! - [`api`]: axum router
//! - [`resilience`]: circuit breaker and retry logic

pub mod advice;
pub mod assessment;
pub mod api;
pub mod config;
pub mod error;
pub mod hasher;
pub mod ledger;
pub mod metrics;
pub mod record;
pub mod resilience;
pub mod service;
pub mod storage;
pub mod store;
pub mod verifier;

pub use config::IntegrityConfig;
pub use error::IntegrityError;
pub use hasher::{hash_record, hash_section, Digest, HashError, SectionHashes};
pub use ledger::{InMemoryLedger, Ledger, LedgerEntry, LedgerError, RpcLedger, TxReceipt};
pub use metrics::LatencyTimer;
pub use record::{PatientId, PatientRecord, Section};
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
pub use resilience::retry::RetryConfig;
pub use service::{HealthCheck, IntegrityService, ServiceState};
pub use storage::{DocumentStore, InMemoryDocumentStore, RedisDocumentStore, StorageError};
pub use store::{StoreReceipt, StoreService};
pub use verifier::{IndeterminateCause, IntegrityVerifier, Verification};
