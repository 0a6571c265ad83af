// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Minimal ABI codec for the patient data contract.
//!
//! The contract keeps each section digest as a `string` holding its
//! `0x`-prefixed lowercase hex, so both entry points carry dynamic data:
//!
//! ```text
//! storePatientData(uint256,string,string,string,string,string,string)
//! getPatientData(uint256) -> (uint256,string x6,uint256)
//! ```
//!
//! # Layout
//!
//! A block of `uint256` + six strings (+ trailing `uint256`) is a head of
//! one word per field, where each string field holds the byte offset of its
//! tail from the start of the block. Each tail is a length word followed by
//! the UTF-8 bytes, zero-padded to a word boundary.
//!
//! `getPatientData` returns a dynamic tuple, so its return data starts with
//! one extra word: the offset of the tuple block (always `0x20`).

use crate::hasher::{keccak256, Digest, SectionHashes};
use crate::record::PatientId;

use super::{LedgerEntry, LedgerError};

pub const STORE_SIGNATURE: &str = "storePatientData(uint256,string,string,string,string,string,string)";
pub const GET_SIGNATURE: &str = "getPatientData(uint256)";

const WORD: usize = 32;
/// patientId + six string offsets + timestamp
const ENTRY_HEAD_WORDS: usize = 8;

/// First four bytes of the keccak of a function signature.
#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_to_u64(word: &[u8]) -> Result<u64, LedgerError> {
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(LedgerError::Decode("uint256 value exceeds u64".into()));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(tail))
}

fn word_to_usize(word: &[u8]) -> Result<usize, LedgerError> {
    usize::try_from(word_to_u64(word)?).map_err(|_| LedgerError::Decode("offset exceeds usize".into()))
}

fn word_at(data: &[u8], position: usize) -> Result<&[u8], LedgerError> {
    position
        .checked_add(WORD)
        .and_then(|end| data.get(position..end))
        .ok_or_else(|| {
            LedgerError::Decode(format!(
                "return data too short: word at {} of {} bytes",
                position,
                data.len()
            ))
        })
}

fn read_string(data: &[u8], position: usize) -> Result<String, LedgerError> {
    let len = word_to_usize(word_at(data, position)?)?;
    let start = position + WORD;
    let bytes = start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| LedgerError::Decode(format!("string at {} overruns return data", position)))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| LedgerError::Decode(format!("string is not UTF-8: {}", e)))
}

/// Encode `leading`, the strings and an optional `trailing` uint as one block.
fn encode_block(leading: u64, strings: &[String], trailing: Option<u64>) -> Vec<u8> {
    let head_len = WORD * (1 + strings.len() + usize::from(trailing.is_some()));
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    head.extend_from_slice(&uint_word(leading));
    for s in strings {
        head.extend_from_slice(&uint_word((head_len + tail.len()) as u64));
        tail.extend_from_slice(&uint_word(s.len() as u64));
        tail.extend_from_slice(s.as_bytes());
        let padding = (WORD - s.len() % WORD) % WORD;
        tail.resize(tail.len() + padding, 0);
    }
    if let Some(value) = trailing {
        head.extend_from_slice(&uint_word(value));
    }

    head.extend_from_slice(&tail);
    head
}

fn digest_strings(hashes: &SectionHashes) -> Vec<String> {
    hashes.to_array().iter().map(Digest::to_string).collect()
}

/// Calldata for `storePatientData`.
#[must_use]
pub fn encode_store(patient_id: PatientId, hashes: &SectionHashes) -> Vec<u8> {
    let mut data = selector(STORE_SIGNATURE).to_vec();
    data.extend_from_slice(&encode_block(patient_id, &digest_strings(hashes), None));
    data
}

/// Calldata for `getPatientData`.
#[must_use]
pub fn encode_get(patient_id: PatientId) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + WORD);
    data.extend_from_slice(&selector(GET_SIGNATURE));
    data.extend_from_slice(&uint_word(patient_id));
    data
}

/// Return data of `getPatientData` for `entry`, as the contract emits it.
#[must_use]
pub fn encode_entry(entry: &LedgerEntry) -> Vec<u8> {
    let mut data = uint_word(WORD as u64).to_vec();
    data.extend_from_slice(&encode_block(
        entry.patient_id,
        &digest_strings(&entry.hashes),
        Some(entry.timestamp),
    ));
    data
}

/// Decode the return data of `getPatientData`.
///
/// Returns `NotFound` for a zero timestamp (the contract's default record,
/// whose digest strings are empty).
pub fn decode_entry(requested: PatientId, output: &[u8]) -> Result<LedgerEntry, LedgerError> {
    let base = word_to_usize(word_at(output, 0)?)?;
    let head = |index: usize| {
        base.checked_add(index * WORD)
            .ok_or_else(|| LedgerError::Decode("tuple offset overflows".into()))
            .and_then(|position| word_at(output, position))
    };

    // Read the last head word first so a short tuple fails before any string.
    let timestamp = word_to_u64(head(ENTRY_HEAD_WORDS - 1)?)?;
    if timestamp == 0 {
        return Err(LedgerError::NotFound(requested));
    }

    let patient_id = word_to_u64(head(0)?)?;
    let mut digests = [Digest::ZERO; 6];
    for (index, slot) in digests.iter_mut().enumerate() {
        let offset = word_to_usize(head(1 + index)?)?;
        let position = base
            .checked_add(offset)
            .ok_or_else(|| LedgerError::Decode("string offset overflows".into()))?;
        let text = read_string(output, position)?;
        *slot = text
            .parse()
            .map_err(|e| LedgerError::Decode(format!("stored hash {:?} is not a digest: {}", text, e)))?;
    }

    Ok(LedgerEntry {
        patient_id,
        hashes: SectionHashes::from_array(digests),
        timestamp,
    })
}

/// `0x`-prefixed hex of arbitrary bytes.
#[must_use]
pub fn to_hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parse `0x`-prefixed hex returned by the node.
pub fn from_hex_data(text: &str) -> Result<Vec<u8>, LedgerError> {
    hex::decode(text.strip_prefix("0x").unwrap_or(text))
        .map_err(|e| LedgerError::Decode(format!("bad hex data: {}", e)))
}

/// Parse a hex quantity such as `"0x1b4"`.
pub fn parse_quantity(text: &str) -> Result<u64, LedgerError> {
    let raw = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(raw, 16).map_err(|e| LedgerError::Decode(format!("bad quantity {}: {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hashes() -> SectionHashes {
        SectionHashes::from_array([
            Digest([1; 32]),
            Digest([2; 32]),
            Digest([3; 32]),
            Digest([4; 32]),
            Digest([5; 32]),
            Digest([6; 32]),
        ])
    }

    fn word_hex(value: u64) -> String {
        format!("{:064x}", value)
    }

    /// One ABI string tail for a 66-char digest: length word + 3 padded words.
    fn digest_tail_hex(digest: &Digest) -> String {
        let text = hex::encode(digest.to_string());
        format!("{}{}{}", word_hex(66), text, "0".repeat(2 * (96 - 66)))
    }

    #[test]
    fn test_erc20_transfer_selector() {
        // well-known selector, checks the keccak + truncation path
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn test_contract_selectors() {
        assert_eq!(selector(STORE_SIGNATURE), [0x90, 0xbc, 0xff, 0xd1]);
        assert_eq!(selector(GET_SIGNATURE), [0x7d, 0x8e, 0x34, 0xf3]);
    }

    #[test]
    fn test_encode_store_layout() {
        let hashes = sample_hashes();
        let data = encode_store(12345, &hashes);

        // selector, 7 head words, 6 tails of 4 words each
        assert_eq!(data.len(), 4 + 32 * 7 + 6 * 128);
        assert_eq!(&data[..4], &[0x90, 0xbc, 0xff, 0xd1]);

        let mut expected = word_hex(12345);
        for i in 0..6u64 {
            expected.push_str(&word_hex(224 + 128 * i));
        }
        for digest in hashes.to_array() {
            expected.push_str(&digest_tail_hex(&digest));
        }
        assert_eq!(hex::encode(&data[4..]), expected);
    }

    #[test]
    fn test_encode_get_layout() {
        let data = encode_get(7);
        assert_eq!(data.len(), 36);
        assert_eq!(&data[..4], &selector(GET_SIGNATURE));
        assert_eq!(data[35], 7);
    }

    #[test]
    fn test_decode_hand_built_contract_return() {
        let hashes = sample_hashes();
        let mut text = word_hex(0x20);
        text.push_str(&word_hex(12345));
        for i in 0..6u64 {
            // tails start after the 8-word head
            text.push_str(&word_hex(256 + 128 * i));
        }
        text.push_str(&word_hex(1_700_000_000));
        for digest in hashes.to_array() {
            text.push_str(&digest_tail_hex(&digest));
        }

        let entry = decode_entry(12345, &hex::decode(text).unwrap()).unwrap();

        assert_eq!(entry.patient_id, 12345);
        assert_eq!(entry.hashes, hashes);
        assert_eq!(entry.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_encode_entry_matches_decode() {
        let entry = LedgerEntry {
            patient_id: 9,
            hashes: sample_hashes(),
            timestamp: 42,
        };
        let output = encode_entry(&entry);
        assert_eq!(output.len(), 32 + 32 * 8 + 6 * 128);
        assert_eq!(decode_entry(9, &output).unwrap(), entry);
    }

    #[test]
    fn test_decode_default_record_is_not_found() {
        // contract default: id 0, six empty strings, timestamp 0
        let mut text = word_hex(0x20);
        text.push_str(&word_hex(0));
        for i in 0..6u64 {
            text.push_str(&word_hex(256 + 32 * i));
        }
        text.push_str(&word_hex(0));
        for _ in 0..6 {
            text.push_str(&word_hex(0));
        }

        let output = hex::decode(text).unwrap();
        assert!(matches!(decode_entry(99, &output), Err(LedgerError::NotFound(99))));
    }

    #[test]
    fn test_decode_zero_hashes_with_timestamp_is_present() {
        let entry = LedgerEntry {
            patient_id: 5,
            hashes: SectionHashes::default(),
            timestamp: 42,
        };
        let decoded = decode_entry(5, &encode_entry(&entry)).unwrap();
        assert!(decoded.hashes.demographics_hash.is_zero());
    }

    #[test]
    fn test_decode_non_digest_string() {
        let mut output = encode_entry(&LedgerEntry {
            patient_id: 1,
            hashes: sample_hashes(),
            timestamp: 42,
        });
        // first tail: length word at 32 + 256, text right after
        output[32 + 256 + 32 + 2] = b'z';
        assert!(matches!(decode_entry(1, &output), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn test_decode_short_output() {
        assert!(matches!(decode_entry(1, &[]), Err(LedgerError::Decode(_))));
        let mut truncated = word_hex(0x20);
        truncated.push_str(&word_hex(1));
        assert!(matches!(
            decode_entry(1, &hex::decode(truncated).unwrap()),
            Err(LedgerError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_oversized_uint() {
        let mut output = encode_entry(&LedgerEntry {
            patient_id: 1,
            hashes: sample_hashes(),
            timestamp: 42,
        });
        output[32] = 0xff;
        assert!(matches!(decode_entry(1, &output), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn test_decode_offset_past_end() {
        let mut output = encode_entry(&LedgerEntry {
            patient_id: 1,
            hashes: sample_hashes(),
            timestamp: 42,
        });
        // point the first string offset far past the data
        output[32 + 32 + 30] = 0xff;
        assert!(matches!(decode_entry(1, &output), Err(LedgerError::Decode(_))));
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(to_hex_data(&[0xde, 0xad]), "0xdead");
        assert_eq!(from_hex_data("0xdead").unwrap(), vec![0xde, 0xad]);
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert!(parse_quantity("0xnope").is_err());
    }
}
