// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Deterministic section hashing.
//!
//! A section digest is `keccak256(canonical_json(section))`, the same hash
//! family the ledger contract platform uses natively.
//!
//! # Canonical JSON
//!
//! Object keys are sorted recursively by byte order and no whitespace is
//! emitted, so two objects that differ only in key order hash identically:
//!
//! ```
//! use patient_integrity::hasher::{canonical_json, hash_section};
//! use serde_json::json;
//!
//! let a = json!({"b": 1, "a": {"y": true, "x": null}});
//! assert_eq!(canonical_json(&a), r#"{"a":{"x":null,"y":true},"b":1}"#);
//!
//! let d1 = hash_section(&json!({"age": 45, "name": "John"})).unwrap();
//! let d2 = hash_section(&json!({"name": "John", "age": 45})).unwrap();
//! assert_eq!(d1, d2);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

use crate::record::{PatientRecord, Section};

#[derive(Error, Debug)]
pub enum HashError {
    #[error("failed to serialize section: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Raw keccak-256 of a byte string.
#[must_use]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// A 32-byte section digest.
///
/// Displays and serializes as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub const ZERO: Digest = Digest([0u8; 32]);

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Hex without the `0x` prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum DigestParseError {
    #[error("invalid hex digest: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("digest must be 32 bytes, got {0}")]
    Length(usize),
}

impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw)?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| DigestParseError::Length(bytes.len()))?;
        Ok(Self(array))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The six section digests of one record, in ledger field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionHashes {
    pub demographics_hash: Digest,
    pub medical_history_hash: Digest,
    pub motor_function_hash: Digest,
    pub speech_swallowing_hash: Digest,
    pub respiratory_sleep_hash: Digest,
    pub cognitive_health_hash: Digest,
}

impl SectionHashes {
    #[must_use]
    pub fn from_array(digests: [Digest; 6]) -> Self {
        let [d0, d1, d2, d3, d4, d5] = digests;
        Self {
            demographics_hash: d0,
            medical_history_hash: d1,
            motor_function_hash: d2,
            speech_swallowing_hash: d3,
            respiratory_sleep_hash: d4,
            cognitive_health_hash: d5,
        }
    }

    #[must_use]
    pub fn to_array(&self) -> [Digest; 6] {
        [
            self.demographics_hash,
            self.medical_history_hash,
            self.motor_function_hash,
            self.speech_swallowing_hash,
            self.respiratory_sleep_hash,
            self.cognitive_health_hash,
        ]
    }

    #[must_use]
    pub fn get(&self, section: Section) -> Digest {
        self.to_array()[section.index()]
    }

    /// Sections whose digests differ between `self` and `other`, in ledger order.
    #[must_use]
    pub fn diff(&self, other: &SectionHashes) -> Vec<Section> {
        Section::ALL
            .into_iter()
            .filter(|s| self.get(*s) != other.get(*s))
            .collect()
    }
}

/// Serialize a JSON value with recursively sorted object keys.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            // Sort explicitly: serde_json's Map keeps insertion order when
            // `preserve_order` is enabled anywhere in the dependency graph.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push('{');
            for (i, (key, child)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push(':');
                write_canonical(child, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, child) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(child, out);
            }
            out.push(']');
        }
        Value::Number(number) => write_number(number, out),
        leaf => out.push_str(&leaf.to_string()),
    }
}

/// Write a number the way ECMAScript `Number.prototype.toString` does, so
/// `80.0` is written `80` and `1e21` is written `1e+21`.
fn write_number(number: &serde_json::Number, out: &mut String) {
    if number.is_i64() || number.is_u64() {
        out.push_str(&number.to_string());
        return;
    }
    let Some(value) = number.as_f64() else {
        out.push_str(&number.to_string());
        return;
    };

    if value == 0.0 {
        // covers -0, which JSON.stringify also writes as 0
        out.push('0');
        return;
    }

    let magnitude = value.abs();
    if (1e-6..1e21).contains(&magnitude) {
        // Display never uses an exponent and drops a zero fraction
        out.push_str(&value.to_string());
    } else {
        let text = format!("{:e}", value);
        match text.split_once('e') {
            Some((mantissa, exponent)) if !exponent.starts_with('-') => {
                out.push_str(mantissa);
                out.push_str("e+");
                out.push_str(exponent);
            }
            _ => out.push_str(&text),
        }
    }
}

/// Hash one section (any serializable value).
pub fn hash_section<T: Serialize + ?Sized>(section: &T) -> Result<Digest, HashError> {
    let value = serde_json::to_value(section)?;
    Ok(Digest(keccak256(canonical_json(&value).as_bytes())))
}

/// Hash all six sections of a record.
pub fn hash_record(record: &PatientRecord) -> Result<SectionHashes, HashError> {
    let mut digests = [Digest::ZERO; 6];
    for section in Section::ALL {
        digests[section.index()] = hash_section(record.section(section))?;
    }
    Ok(SectionHashes::from_array(digests))
}
