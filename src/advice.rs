// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Caregiver advice derived from a stored patient document.
//!
//! Daily care items are rule-driven; emergency protocols and support
//! resources are a fixed set returned with every answer. The response keeps
//! snake_case keys because the caregiver dashboard reads them that way.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CareItem {
    pub id: u32,
    pub category: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub importance: &'static str,
    pub frequency: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreathingProtocol {
    pub symptoms: Vec<&'static str>,
    pub immediate_actions: Vec<&'static str>,
    pub contact_numbers: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallProtocol {
    pub assessment_steps: Vec<&'static str>,
    pub immediate_actions: Vec<&'static str>,
    pub prevention_tips: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmergencyProtocols {
    pub breathing_difficulties: BreathingProtocol,
    pub falls: FallProtocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupportResource {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub link: &'static str,
    pub contact: &'static str,
    pub schedule: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaregiverAdvice {
    pub daily_care: Vec<CareItem>,
    pub emergency_protocols: EmergencyProtocols,
    pub support_resources: Vec<SupportResource>,
}

const FALL_PREVENTION: CareItem = CareItem {
    id: 1,
    category: "Physical Care",
    title: "Fall Prevention",
    description: "High fall frequency detected. Consider physical therapy or assistive devices.",
    importance: "High",
    frequency: "Daily",
};

const MEDICATION_ADHERENCE: CareItem = CareItem {
    id: 2,
    category: "Medication",
    title: "Medication Adherence",
    description: "Set up medication reminders to avoid missed doses.",
    importance: "High",
    frequency: "Daily",
};

const SPEECH_THERAPY: CareItem = CareItem {
    id: 3,
    category: "Speech and Swallowing",
    title: "Speech Therapy",
    description: "Consider speech therapy consultation for severe swallowing difficulty.",
    importance: "High",
    frequency: "As recommended by therapist",
};

/// More than this many missed doses triggers the adherence item.
const MISSED_DOSE_LIMIT: f64 = 2.0;

/// Build caregiver advice for one patient document.
#[must_use]
pub fn generate_advice(document: &Value) -> CaregiverAdvice {
    let mut daily_care = Vec::new();

    let fall_frequency = document
        .pointer("/assessments/motorFunction/gaitMetrics/fallFrequency")
        .or_else(|| document.pointer("/motorFunction/gaitMetrics/fallFrequency"));
    if fall_frequency.is_some_and(is_truthy) {
        daily_care.push(FALL_PREVENTION);
    }

    let missed_doses = document
        .pointer("/medication_adherence/missed_doses")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    if missed_doses > MISSED_DOSE_LIMIT {
        daily_care.push(MEDICATION_ADHERENCE);
    }

    let swallowing = document
        .pointer("/speech_swallowing/swallowing_ability")
        .or_else(|| document.pointer("/speechSwallowing/swallowing_ability"))
        .and_then(Value::as_str);
    if swallowing == Some("severe") {
        daily_care.push(SPEECH_THERAPY);
    }

    CaregiverAdvice {
        daily_care,
        emergency_protocols: emergency_protocols(),
        support_resources: support_resources(),
    }
}

/// JSON truthiness: null, false, zero and empty strings or containers are false.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn emergency_protocols() -> EmergencyProtocols {
    EmergencyProtocols {
        breathing_difficulties: BreathingProtocol {
            symptoms: vec!["Rapid breathing", "Shortness of breath", "Blue-tinted lips or fingers"],
            immediate_actions: vec![
                "Call emergency services",
                "Help patient into upright position",
                "Use prescribed breathing equipment if available",
            ],
            contact_numbers: vec!["911", "Primary Doctor: (555) 123-4567"],
        },
        falls: FallProtocol {
            assessment_steps: vec!["Check for consciousness", "Look for injuries", "Don't move if back/neck pain"],
            immediate_actions: vec![
                "Call for help if needed",
                "Keep patient calm and still",
                "Apply first aid if necessary",
            ],
            prevention_tips: vec!["Keep pathways clear", "Install grab bars", "Use mobility aids"],
        },
    }
}

fn support_resources() -> Vec<SupportResource> {
    vec![
        SupportResource {
            name: "ALS Association Support Group",
            kind: "Support",
            link: "https://www.als.org/local-support",
            contact: "(555) 789-0123",
            schedule: "Weekly meetings on Thursdays",
        },
        SupportResource {
            name: "Caregiver Training Program",
            kind: "Education",
            link: "https://www.alscaregiver.org/training",
            contact: "(555) 456-7890",
            schedule: "Monthly workshops",
        },
    ]
}
