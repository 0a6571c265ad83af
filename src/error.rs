// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Top-level error taxonomy.
//!
//! Each layer keeps its own `thiserror` enum ([`HashError`], [`LedgerError`],
//! [`StorageError`]). [`IntegrityError`] is what the store service, the
//! verifier's `into_result` and the service API return.

use thiserror::Error;

use crate::hasher::HashError;
use crate::ledger::LedgerError;
use crate::record::Section;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum IntegrityError {
    #[error("failed to serialize section: {0}")]
    Serialization(String),

    #[error("ledger write failed: {0}")]
    LedgerWrite(#[source] LedgerError),

    #[error("ledger read failed: {0}")]
    LedgerRead(#[source] LedgerError),

    #[error("record does not match ledger in sections: {}", display_sections(.sections))]
    ValidationFailed { sections: Vec<Section> },

    #[error("verification indeterminate: {0}")]
    VerificationIndeterminate(String),

    #[error("invalid patient record: {0}")]
    InvalidRecord(String),

    #[error("document store error: {0}")]
    Storage(#[from] StorageError),

    #[error("service not ready (state: {0})")]
    NotReady(String),
}

fn display_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| s.field_name())
        .collect::<Vec<_>>()
        .join(", ")
}

impl IntegrityError {
    /// Wrap a ledger error raised by a write.
    #[must_use]
    pub fn ledger_write(err: LedgerError) -> Self {
        Self::LedgerWrite(err)
    }

    /// Wrap a ledger error raised by a read.
    #[must_use]
    pub fn ledger_read(err: LedgerError) -> Self {
        Self::LedgerRead(err)
    }

    /// Whether the failed operation may succeed if repeated.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LedgerWrite(e) | Self::LedgerRead(e) => e.is_retryable(),
            Self::Storage(StorageError::Backend(_)) => true,
            _ => false,
        }
    }
}

impl From<HashError> for IntegrityError {
    fn from(err: HashError) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_failed_lists_sections() {
        let err = IntegrityError::ValidationFailed {
            sections: vec![Section::Demographics, Section::CognitiveHealth],
        };
        assert_eq!(
            err.to_string(),
            "record does not match ledger in sections: demographics, cognitiveHealth"
        );
    }

    #[test]
    fn test_ledger_errors_keep_direction() {
        let write = IntegrityError::ledger_write(LedgerError::Reverted { tx_hash: "0xab".into() });
        assert!(matches!(write, IntegrityError::LedgerWrite(LedgerError::Reverted { .. })));
        assert!(!write.is_retryable());

        let read = IntegrityError::ledger_read(LedgerError::Unavailable);
        assert!(matches!(read, IntegrityError::LedgerRead(_)));
        assert!(read.is_retryable());
    }

    #[test]
    fn test_storage_conversion() {
        let err: IntegrityError = StorageError::Backend("connection refused".into()).into();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("connection refused"));
    }
}
