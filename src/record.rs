// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Patient record data structure.
//!
//! A [`PatientRecord`] is the unit that gets anchored on the ledger. It is made
//! of six independently hashed [`Section`]s, each an arbitrary JSON object.
//!
//! # Example
//!
//! ```
//! use patient_integrity::{PatientRecord, Section};
//! use serde_json::json;
//!
//! let record: PatientRecord = serde_json::from_value(json!({
//!     "demographics": {"age": 45},
//!     "medicalHistory": {"dx": "ALS"}
//! })).unwrap();
//!
//! assert_eq!(record.section(Section::Demographics)["age"], 45);
//! assert!(record.section(Section::CognitiveHealth).is_empty());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ledger-side patient identifier (`uint256` on chain, `u64` here).
pub type PatientId = u64;

/// A JSON object holding one section's fields.
pub type SectionData = Map<String, Value>;

/// One of the six named subsets of a patient record.
///
/// Declaration order is the ledger's field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    Demographics,
    MedicalHistory,
    MotorFunction,
    SpeechSwallowing,
    RespiratorySleep,
    CognitiveHealth,
}

impl Section {
    /// All sections in ledger order.
    pub const ALL: [Section; 6] = [
        Section::Demographics,
        Section::MedicalHistory,
        Section::MotorFunction,
        Section::SpeechSwallowing,
        Section::RespiratorySleep,
        Section::CognitiveHealth,
    ];

    /// Position of this section in the ledger tuple.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// JSON field name of this section in a patient document.
    #[must_use]
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Demographics => "demographics",
            Self::MedicalHistory => "medicalHistory",
            Self::MotorFunction => "motorFunction",
            Self::SpeechSwallowing => "speechSwallowing",
            Self::RespiratorySleep => "respiratorySleep",
            Self::CognitiveHealth => "cognitiveHealth",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field_name())
    }
}

/// A patient assessment, split into the six hashed sections.
///
/// Missing sections deserialize as empty objects. Fields outside the six
/// sections are ignored here; they stay in the stored document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    #[serde(default)]
    pub demographics: SectionData,
    #[serde(default)]
    pub medical_history: SectionData,
    #[serde(default)]
    pub motor_function: SectionData,
    #[serde(default)]
    pub speech_swallowing: SectionData,
    #[serde(default)]
    pub respiratory_sleep: SectionData,
    #[serde(default)]
    pub cognitive_health: SectionData,
}

impl PatientRecord {
    /// Borrow a section by name.
    #[must_use]
    pub fn section(&self, section: Section) -> &SectionData {
        match section {
            Section::Demographics => &self.demographics,
            Section::MedicalHistory => &self.medical_history,
            Section::MotorFunction => &self.motor_function,
            Section::SpeechSwallowing => &self.speech_swallowing,
            Section::RespiratorySleep => &self.respiratory_sleep,
            Section::CognitiveHealth => &self.cognitive_health,
        }
    }

    /// Mutably borrow a section by name.
    pub fn section_mut(&mut self, section: Section) -> &mut SectionData {
        match section {
            Section::Demographics => &mut self.demographics,
            Section::MedicalHistory => &mut self.medical_history,
            Section::MotorFunction => &mut self.motor_function,
            Section::SpeechSwallowing => &mut self.speech_swallowing,
            Section::RespiratorySleep => &mut self.respiratory_sleep,
            Section::CognitiveHealth => &mut self.cognitive_health,
        }
    }

    /// Parse a record out of a stored patient document.
    pub fn from_document(document: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(document)
    }
}
