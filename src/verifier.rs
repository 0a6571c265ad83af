// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Section-wise verification of a patient record against its ledger entry.
//!
//! ```text
//! record ──hash_record──► local (h1..h6)
//!                               │  compare per section
//! ledger.fetch(id) ─────► anchored (h1..h6)
//! ```
//!
//! All six sections are hashed before the ledger is read, so a record that
//! cannot be serialized never costs a round trip. The ledger is read exactly
//! once per verification.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::IntegrityError;
use crate::hasher::hash_record;
use crate::ledger::{Ledger, LedgerError};
use crate::metrics;
use crate::record::{PatientId, PatientRecord, Section};

/// Why a verification could not reach a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum IndeterminateCause {
    /// The ledger has no entry for this patient.
    NotAnchored,
    /// The ledger could not be read.
    Ledger(String),
    /// The local record could not be hashed.
    Serialization(String),
}

impl std::fmt::Display for IndeterminateCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnchored => write!(f, "patient has no ledger entry"),
            Self::Ledger(reason) => write!(f, "ledger unavailable: {}", reason),
            Self::Serialization(reason) => write!(f, "record could not be hashed: {}", reason),
        }
    }
}

/// Outcome of checking a record against the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Every section matches its anchored digest.
    Verified,
    /// These sections differ, in ledger order.
    Mismatched { sections: Vec<Section> },
    /// No verdict could be reached.
    Indeterminate(IndeterminateCause),
}

impl Verification {
    /// `true` only for [`Verification::Verified`].
    #[must_use]
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }

    /// Short label: `verified`, `mismatched` or `indeterminate`.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Verified => "verified",
            Self::Mismatched { .. } => "mismatched",
            Self::Indeterminate(_) => "indeterminate",
        }
    }

    /// Sections that failed, empty unless mismatched.
    #[must_use]
    pub fn mismatched_sections(&self) -> &[Section] {
        match self {
            Self::Mismatched { sections } => sections,
            _ => &[],
        }
    }

    pub fn into_result(self) -> Result<(), IntegrityError> {
        match self {
            Self::Verified => Ok(()),
            Self::Mismatched { sections } => Err(IntegrityError::ValidationFailed { sections }),
            Self::Indeterminate(cause) => Err(IntegrityError::VerificationIndeterminate(cause.to_string())),
        }
    }
}

/// Recomputes section hashes and compares them with the ledger.
#[derive(Clone)]
pub struct IntegrityVerifier {
    ledger: Arc<dyn Ledger>,
}

impl IntegrityVerifier {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    #[tracing::instrument(skip(self, record))]
    pub async fn verify(&self, patient_id: PatientId, record: &PatientRecord) -> Verification {
        let verification = self.check(patient_id, record).await;
        metrics::record_verification(verification.status());
        for section in verification.mismatched_sections() {
            metrics::record_section_mismatch(section.field_name());
        }
        verification
    }

    /// Boolean form: only `Verified` is `true`.
    pub async fn verify_bool(&self, patient_id: PatientId, record: &PatientRecord) -> bool {
        self.verify(patient_id, record).await.is_verified()
    }

    async fn check(&self, patient_id: PatientId, record: &PatientRecord) -> Verification {
        let local = match hash_record(record) {
            Ok(hashes) => hashes,
            Err(e) => {
                warn!(error = %e, "Could not hash record for verification");
                return Verification::Indeterminate(IndeterminateCause::Serialization(e.to_string()));
            }
        };

        let anchored = match self.ledger.fetch(patient_id).await {
            Ok(entry) => entry,
            Err(LedgerError::NotFound(_)) => {
                debug!("Patient not anchored");
                return Verification::Indeterminate(IndeterminateCause::NotAnchored);
            }
            Err(e) => {
                warn!(error = %e, "Ledger read failed during verification");
                return Verification::Indeterminate(IndeterminateCause::Ledger(e.to_string()));
            }
        };

        let sections = local.diff(&anchored.hashes);
        if sections.is_empty() {
            debug!("All sections verified");
            Verification::Verified
        } else {
            warn!(?sections, "Record diverges from ledger");
            Verification::Mismatched { sections }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash_record;
    use crate::ledger::InMemoryLedger;
    use serde_json::json;

    fn record() -> PatientRecord {
        serde_json::from_value(json!({
            "demographics": {"age": 45, "sex": "F"},
            "medicalHistory": {"dx": "ALS", "onset": 2019},
            "motorFunction": {"gaitMetrics": {"fallFrequency": 2}},
            "speechSwallowing": {"swallowing_ability": "mild"},
            "respiratorySleep": {"fvc": 71.5},
            "cognitiveHealth": {"ecas": 105}
        }))
        .unwrap()
    }

    async fn anchored(ledger: &InMemoryLedger, id: PatientId, record: &PatientRecord) {
        ledger.upsert(id, &hash_record(record).unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_untampered_record_verifies() {
        let ledger = Arc::new(InMemoryLedger::new());
        let rec = record();
        anchored(&ledger, 12345, &rec).await;

        let verifier = IntegrityVerifier::new(ledger);
        assert_eq!(verifier.verify(12345, &rec).await, Verification::Verified);
        assert!(verifier.verify_bool(12345, &rec).await);
    }

    #[tokio::test]
    async fn test_single_section_tamper_is_localized() {
        let ledger = Arc::new(InMemoryLedger::new());
        let rec = record();
        anchored(&ledger, 1, &rec).await;

        let mut tampered = rec.clone();
        tampered.respiratory_sleep.insert("fvc".into(), json!(90.0));

        let verifier = IntegrityVerifier::new(ledger);
        let result = verifier.verify(1, &tampered).await;
        assert_eq!(
            result,
            Verification::Mismatched {
                sections: vec![Section::RespiratorySleep]
            }
        );
        assert!(!result.is_verified());
    }

    #[tokio::test]
    async fn test_every_tampered_section_is_reported() {
        let ledger = Arc::new(InMemoryLedger::new());
        let rec = record();
        anchored(&ledger, 1, &rec).await;

        let mut tampered = rec.clone();
        tampered.demographics.insert("age".into(), json!(46));
        tampered.cognitive_health.clear();

        let verifier = IntegrityVerifier::new(ledger);
        let result = verifier.verify(1, &tampered).await;
        assert_eq!(
            result.mismatched_sections(),
            &[Section::Demographics, Section::CognitiveHealth]
        );
    }

    #[tokio::test]
    async fn test_unknown_patient_is_indeterminate() {
        let verifier = IntegrityVerifier::new(Arc::new(InMemoryLedger::new()));
        let result = verifier.verify(99, &record()).await;

        assert_eq!(result, Verification::Indeterminate(IndeterminateCause::NotAnchored));
        assert!(!result.is_verified());
    }

    #[tokio::test]
    async fn test_ledger_outage_is_not_a_mismatch() {
        let ledger = Arc::new(InMemoryLedger::new());
        let rec = record();
        anchored(&ledger, 1, &rec).await;
        ledger.set_available(false);

        let verifier = IntegrityVerifier::new(ledger);
        let result = verifier.verify(1, &rec).await;
        assert!(matches!(result, Verification::Indeterminate(IndeterminateCause::Ledger(_))));
    }

    #[tokio::test]
    async fn test_update_supersedes_previous_anchor() {
        let ledger = Arc::new(InMemoryLedger::new());
        let old = record();
        anchored(&ledger, 1, &old).await;
        let mut new = old.clone();
        new.medical_history.insert("onset".into(), json!(2020));
        anchored(&ledger, 1, &new).await;

        let verifier = IntegrityVerifier::new(ledger);
        assert!(verifier.verify_bool(1, &new).await);
        assert_eq!(
            verifier.verify(1, &old).await.mismatched_sections(),
            &[Section::MedicalHistory]
        );
    }

    #[test]
    fn test_into_result_mapping() {
        assert!(Verification::Verified.into_result().is_ok());
        assert!(matches!(
            Verification::Mismatched { sections: vec![Section::MotorFunction] }.into_result(),
            Err(IntegrityError::ValidationFailed { .. })
        ));
        assert!(matches!(
            Verification::Indeterminate(IndeterminateCause::NotAnchored).into_result(),
            Err(IntegrityError::VerificationIndeterminate(_))
        ));
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(Verification::Verified.status(), "verified");
        assert_eq!(Verification::Mismatched { sections: vec![] }.status(), "mismatched");
        assert_eq!(
            Verification::Indeterminate(IndeterminateCause::Ledger("x".into())).status(),
            "indeterminate"
        );
    }
}
