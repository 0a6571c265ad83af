// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Assessment intake and the read-side summaries built on stored documents.
//!
//! # Intake
//!
//! The assessment form arrives flat (`patientAge`, `gaitMetrics`,
//! `speechClarity`, ...). [`build_document`] checks the required fields and
//! folds them into a patient document whose six anchored sections are the
//! ones [`crate::record::Section`] hashes:
//!
//! ```text
//! form field              → document
//! patientAge/Gender       → demographics
//! diagnosis*, medications → medicalHistory
//! gait/tremor/handwriting → motorFunction
//! speech/swallowing/face  → speechSwallowing
//! breathing/sleep         → respiratorySleep
//! memory/hallucinations   → cognitiveHealth
//! ```
//!
//! Caregiver details, adherence, alert triggers and stress ride along
//! unanchored, next to the sections.
//!
//! # Summaries
//!
//! [`frequency_analysis`] counts symptom events and [`visualization`] pulls
//! out the metric subsets a dashboard charts. Both accept documents written
//! by intake and documents posted directly with `assessments.*` nesting.

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::advice::is_truthy;

/// Form fields that must be present and non-empty.
pub const REQUIRED_FIELDS: [&str; 26] = [
    "patientName",
    "patientAge",
    "patientGender",
    "diagnosisDate",
    "diagnosisStage",
    "medicalHistory",
    "currentMedications",
    "familyHistory",
    "caregiverInfo",
    "gaitMetrics",
    "tremorMetrics",
    "muscleWeakness",
    "dyskinesia",
    "handwriting",
    "assistiveDevice",
    "speechClarity",
    "swallowingDifficulty",
    "facialControl",
    "breathingPatterns",
    "sleepQuality",
    "memoryDecline",
    "hallucinations",
    "medicationAdherence",
    "sideEffects",
    "emergencyAlertTriggers",
    "caregiverStress",
];

const DATA_PERIOD: &str = "last 30 days";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IntakeError {
    #[error("assessment must be a JSON object")]
    NotAnObject,
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

fn field(form: &Value, key: &str) -> Value {
    form.get(key).cloned().unwrap_or_else(|| json!(""))
}

fn nested(form: &Value, key: &str, inner: &str) -> Value {
    form.get(key)
        .and_then(|v| v.get(inner))
        .cloned()
        .unwrap_or_else(|| json!(""))
}

/// Age as a whole number; anything but digits (or a non-negative integer) is 0.
fn parse_age(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// Validate a flat assessment form and fold it into a patient document.
pub fn build_document(form: &Value) -> Result<Value, IntakeError> {
    if !form.is_object() {
        return Err(IntakeError::NotAnObject);
    }

    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|key| !form.get(*key).is_some_and(is_truthy))
        .collect();
    if !missing.is_empty() {
        return Err(IntakeError::MissingFields(missing));
    }

    let mut adherence = match form.get("medicationAdherence") {
        Some(Value::Object(map)) => map.clone(),
        other => {
            let mut map = Map::new();
            map.insert("adherence".into(), other.cloned().unwrap_or(Value::Null));
            map
        }
    };
    adherence.insert("side_effects".into(), field(form, "sideEffects"));

    Ok(json!({
        "personal_info": {
            "name": field(form, "patientName"),
            "dateOfBirth": field(form, "dateOfBirth"),
            "patientAge": field(form, "patientAge"),
            "patientGender": field(form, "patientGender"),
        },
        "demographics": {
            "age": parse_age(form.get("patientAge")),
            "gender": field(form, "patientGender"),
            "location": field(form, "location"),
        },
        "medicalHistory": {
            "diagnosisDate": field(form, "diagnosisDate"),
            "diagnosisStage": field(form, "diagnosisStage"),
            "familyHistory": field(form, "familyHistory"),
            "medications": form.get("currentMedications").cloned().unwrap_or_else(|| json!([])),
            "comorbidities": nested(form, "medicalHistory", "comorbidities"),
            "hospitalizations": nested(form, "medicalHistory", "hospitalizations"),
            "allergies": nested(form, "medicalHistory", "allergies"),
        },
        "motorFunction": {
            "gaitMetrics": field(form, "gaitMetrics"),
            "tremorMetrics": field(form, "tremorMetrics"),
            "muscleWeakness": field(form, "muscleWeakness"),
            "dyskinesia": field(form, "dyskinesia"),
            "handwriting": field(form, "handwriting"),
            "assistiveDevice": field(form, "assistiveDevice"),
        },
        "speechSwallowing": {
            "speechClarity": field(form, "speechClarity"),
            "swallowingDifficulty": field(form, "swallowingDifficulty"),
            "facialControl": field(form, "facialControl"),
        },
        "respiratorySleep": {
            "breathingPatterns": field(form, "breathingPatterns"),
            "sleepQuality": field(form, "sleepQuality"),
        },
        "cognitiveHealth": {
            "memoryDecline": field(form, "memoryDecline"),
            "hallucinations": field(form, "hallucinations"),
        },
        "caregiverInfo": {
            "primaryCaregiver": nested(form, "caregiverInfo", "primaryCaregiver"),
            "emergencyContact": nested(form, "caregiverInfo", "emergencyContact"),
            "relationship": nested(form, "caregiverInfo", "relationship"),
        },
        "medication_adherence": adherence,
        "emergencyAlertTriggers": form.get("emergencyAlertTriggers").cloned().unwrap_or_else(|| json!([])),
        "caregiverStress": field(form, "caregiverStress"),
    }))
}

/// First pointer that resolves.
fn lookup<'a>(document: &'a Value, pointers: &[&str]) -> Option<&'a Value> {
    pointers.iter().find_map(|p| document.pointer(p))
}

fn motor<'a>(document: &'a Value, tail: &str) -> Option<&'a Value> {
    let nested = format!("/assessments/motorFunction{}", tail);
    let flat = format!("/motorFunction{}", tail);
    lookup(document, &[nested.as_str(), flat.as_str()])
}

fn speech(document: &Value) -> Option<&Value> {
    lookup(document, &["/speech_swallowing", "/speechSwallowing"])
}

fn cognitive(document: &Value) -> Option<&Value> {
    lookup(document, &["/assessments/cognitiveHealth", "/cognitiveHealth"])
}

/// A count from a number or a numeric string; anything else counts 0.
fn count(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn array_len(value: Option<&Value>) -> u64 {
    value.and_then(Value::as_array).map_or(0, |a| a.len() as u64)
}

fn date(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

fn object_or_empty(value: Option<&Value>) -> Value {
    match value {
        Some(v @ Value::Object(_)) => v.clone(),
        _ => json!({}),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymptomFrequency {
    pub falls: u64,
    pub medication_missed: u64,
    pub side_effects: u64,
    pub emergency_triggers: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssessmentDates {
    pub last_motor_assessment: Option<String>,
    pub last_speech_assessment: Option<String>,
    pub last_cognitive_assessment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemporalAnalysis {
    pub assessment_dates: AssessmentDates,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrequencyAnalysis {
    pub symptom_frequency: SymptomFrequency,
    pub temporal_analysis: TemporalAnalysis,
    pub data_period: &'static str,
}

/// Symptom event counts and last assessment dates for one document.
#[must_use]
pub fn frequency_analysis(document: &Value) -> FrequencyAnalysis {
    FrequencyAnalysis {
        symptom_frequency: SymptomFrequency {
            falls: count(motor(document, "/gaitMetrics/fallFrequency")),
            medication_missed: count(document.pointer("/medication_adherence/missed_doses")),
            side_effects: array_len(document.pointer("/medication_adherence/side_effects")),
            emergency_triggers: array_len(document.get("emergencyAlertTriggers")),
        },
        temporal_analysis: TemporalAnalysis {
            assessment_dates: AssessmentDates {
                last_motor_assessment: date(motor(document, "/last_assessment")),
                last_speech_assessment: date(speech(document).and_then(|s| s.get("last_assessment"))),
                last_cognitive_assessment: date(cognitive(document).and_then(|c| c.get("last_assessment"))),
            },
        },
        data_period: DATA_PERIOD,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotorMetrics {
    pub gait: Value,
    pub muscle_weakness: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub motor_function: MotorMetrics,
    pub speech: Value,
    pub cognitive: Value,
    pub medication: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Visualization {
    pub metrics: Metrics,
}

/// The metric subsets of a document, each an object (empty when absent).
#[must_use]
pub fn visualization(document: &Value) -> Visualization {
    Visualization {
        metrics: Metrics {
            motor_function: MotorMetrics {
                gait: object_or_empty(motor(document, "/gaitMetrics")),
                muscle_weakness: object_or_empty(motor(document, "/muscleWeakness")),
            },
            speech: object_or_empty(speech(document)),
            cognitive: object_or_empty(cognitive(document)),
            medication: object_or_empty(document.get("medication_adherence")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{PatientRecord, Section};

    fn form() -> Value {
        json!({
            "userId": "12345",
            "patientName": "Jane Doe",
            "dateOfBirth": "1979-05-01",
            "patientAge": "45",
            "patientGender": "F",
            "location": "Leeds",
            "diagnosisDate": "2019-02-01",
            "diagnosisStage": "early",
            "medicalHistory": {"comorbidities": "none", "allergies": "penicillin"},
            "currentMedications": ["riluzole"],
            "familyHistory": "none",
            "caregiverInfo": {"primaryCaregiver": "Sam", "relationship": "spouse"},
            "gaitMetrics": {"strideLength": "0.6", "stepCount": "3000", "fallFrequency": "2"},
            "tremorMetrics": "mild",
            "muscleWeakness": {"gripStrength": "20"},
            "dyskinesia": "none",
            "handwriting": "legible",
            "assistiveDevice": ["cane"],
            "speechClarity": "slurred",
            "swallowingDifficulty": "moderate",
            "facialControl": "reduced",
            "breathingPatterns": "shallow",
            "sleepQuality": "poor",
            "memoryDecline": "none",
            "hallucinations": "none",
            "medicationAdherence": {"missed_doses": 3},
            "sideEffects": ["nausea", "fatigue"],
            "emergencyAlertTriggers": ["choking"],
            "caregiverStress": "high"
        })
    }

    #[test]
    fn test_intake_builds_sectioned_document() {
        let document = build_document(&form()).unwrap();

        assert_eq!(document["demographics"], json!({"age": 45, "gender": "F", "location": "Leeds"}));
        assert_eq!(document["medicalHistory"]["medications"], json!(["riluzole"]));
        assert_eq!(document["medicalHistory"]["allergies"], json!("penicillin"));
        assert_eq!(document["medicalHistory"]["hospitalizations"], json!(""));
        assert_eq!(document["motorFunction"]["gaitMetrics"]["fallFrequency"], json!("2"));
        assert_eq!(document["respiratorySleep"]["sleepQuality"], json!("poor"));
        assert_eq!(document["caregiverInfo"]["emergencyContact"], json!(""));
        assert_eq!(
            document["medication_adherence"],
            json!({"missed_doses": 3, "side_effects": ["nausea", "fatigue"]})
        );
    }

    #[test]
    fn test_intake_document_is_a_valid_record() {
        let document = build_document(&form()).unwrap();
        let record = PatientRecord::from_document(&document).unwrap();
        assert_eq!(record.section(Section::Demographics)["age"], json!(45));
        assert_eq!(record.section(Section::CognitiveHealth)["hallucinations"], json!("none"));
    }

    #[test]
    fn test_intake_reports_missing_fields_in_order() {
        let mut form = form();
        form["sleepQuality"] = json!("");
        form["sideEffects"] = json!([]);
        form.as_object_mut().unwrap().remove("patientName");

        let err = build_document(&form).unwrap_err();
        assert_eq!(
            err,
            IntakeError::MissingFields(vec!["patientName", "sleepQuality", "sideEffects"])
        );
        assert_eq!(
            err.to_string(),
            "Missing required fields: patientName, sleepQuality, sideEffects"
        );
    }

    #[test]
    fn test_intake_rejects_non_object() {
        assert_eq!(build_document(&json!([1, 2])), Err(IntakeError::NotAnObject));
    }

    #[test]
    fn test_age_parsing() {
        assert_eq!(parse_age(Some(&json!("45"))), 45);
        assert_eq!(parse_age(Some(&json!(45))), 45);
        assert_eq!(parse_age(Some(&json!("45 years"))), 0);
        assert_eq!(parse_age(Some(&json!("-3"))), 0);
        assert_eq!(parse_age(None), 0);
    }

    #[test]
    fn test_scalar_adherence_is_wrapped() {
        let mut form = form();
        form["medicationAdherence"] = json!("good");
        let document = build_document(&form).unwrap();
        assert_eq!(
            document["medication_adherence"],
            json!({"adherence": "good", "side_effects": ["nausea", "fatigue"]})
        );
    }

    #[test]
    fn test_frequency_analysis_of_intake_document() {
        let analysis = frequency_analysis(&build_document(&form()).unwrap());

        assert_eq!(
            analysis.symptom_frequency,
            SymptomFrequency {
                falls: 2,
                medication_missed: 3,
                side_effects: 2,
                emergency_triggers: 1,
            }
        );
        assert_eq!(analysis.temporal_analysis.assessment_dates.last_motor_assessment, None);
    }

    #[test]
    fn test_frequency_analysis_of_nested_assessments() {
        let analysis = frequency_analysis(&json!({
            "assessments": {
                "motorFunction": {"gaitMetrics": {"fallFrequency": 4}, "last_assessment": "2024-03-01"},
                "cognitiveHealth": {"last_assessment": "2024-02-01"}
            },
            "speech_swallowing": {"last_assessment": "2024-01-15"}
        }));

        assert_eq!(analysis.symptom_frequency.falls, 4);
        assert_eq!(analysis.symptom_frequency.medication_missed, 0);
        let dates = &analysis.temporal_analysis.assessment_dates;
        assert_eq!(dates.last_motor_assessment.as_deref(), Some("2024-03-01"));
        assert_eq!(dates.last_speech_assessment.as_deref(), Some("2024-01-15"));
        assert_eq!(dates.last_cognitive_assessment.as_deref(), Some("2024-02-01"));
    }

    #[test]
    fn test_frequency_analysis_of_empty_document() {
        let value = serde_json::to_value(frequency_analysis(&json!({}))).unwrap();
        assert_eq!(
            value["symptom_frequency"],
            json!({"falls": 0, "medication_missed": 0, "side_effects": 0, "emergency_triggers": 0})
        );
        assert_eq!(value["temporal_analysis"]["assessment_dates"]["last_speech_assessment"], Value::Null);
        assert_eq!(value["data_period"], json!("last 30 days"));
    }

    #[test]
    fn test_non_numeric_fall_frequency_counts_zero() {
        let analysis = frequency_analysis(&json!({"motorFunction": {"gaitMetrics": {"fallFrequency": "weekly"}}}));
        assert_eq!(analysis.symptom_frequency.falls, 0);
    }

    #[test]
    fn test_visualization_subsets() {
        let view = visualization(&build_document(&form()).unwrap());

        assert_eq!(view.metrics.motor_function.gait["stepCount"], json!("3000"));
        assert_eq!(view.metrics.motor_function.muscle_weakness, json!({"gripStrength": "20"}));
        assert_eq!(view.metrics.speech["speechClarity"], json!("slurred"));
        assert_eq!(view.metrics.cognitive["memoryDecline"], json!("none"));
        assert_eq!(view.metrics.medication["missed_doses"], json!(3));
    }

    #[test]
    fn test_visualization_of_empty_document() {
        let view = visualization(&json!({"motorFunction": {"gaitMetrics": "n/a"}}));
        assert_eq!(view.metrics.motor_function.gait, json!({}));
        assert_eq!(view.metrics.speech, json!({}));
        assert_eq!(view.metrics.medication, json!({}));
    }
}
