//! Integrity envelope and checksum codec
//!
//! The payload is serialized once, and the tag is computed over exactly
//! those bytes. The payload JSON travels inside the envelope as a string so a
//! reload hashes the same bytes that were written. Progress records and
//! settings are both stored this way.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current envelope layout
pub const ENVELOPE_VERSION: u32 = 2;

/// Hex characters kept from the BLAKE3 digest
pub const TAG_LEN: usize = 16;

/// Why a stored record was not trusted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u32),
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Deterministic, order-sensitive tag over `bytes`
pub fn compute_tag(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().as_str()[..TAG_LEN].to_string()
}

/// Serialized record plus its tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityEnvelope {
    pub version: u32,
    /// Record JSON, hashed byte-for-byte
    pub record: String,
    pub checksum: String,
}

impl IntegrityEnvelope {
    /// Serialize `value` and tag it
    pub fn seal<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(value)?;
        let checksum = compute_tag(json.as_bytes());
        Ok(Self {
            version: ENVELOPE_VERSION,
            record: json,
            checksum,
        })
    }

    /// Parse a stored envelope string (no verification)
    pub fn parse(raw: &str) -> Result<Self, IntegrityError> {
        serde_json::from_str(raw).map_err(|e| IntegrityError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Verify the tag and only then decode the payload
    pub fn open<T: DeserializeOwned>(&self) -> Result<T, IntegrityError> {
        if self.version != ENVELOPE_VERSION {
            return Err(IntegrityError::UnsupportedVersion(self.version));
        }
        if !verify(self) {
            return Err(IntegrityError::ChecksumMismatch);
        }
        serde_json::from_str(&self.record).map_err(|e| IntegrityError::Malformed(e.to_string()))
    }
}

/// Recompute and compare by exact equality
pub fn verify(envelope: &IntegrityEnvelope) -> bool {
    compute_tag(envelope.record.as_bytes()) == envelope.checksum
}

/// [`verify`] on a raw stored string; malformed input is just `false`
pub fn verify_str(raw: &str) -> bool {
    IntegrityEnvelope::parse(raw)
        .map(|envelope| verify(&envelope))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{AccessCode, ProgressRecord};
    use proptest::prelude::*;

    fn sample() -> ProgressRecord {
        let mut record = ProgressRecord::new(AccessCode::parse("AB12").unwrap());
        record.add_xp(420, 1_000_000);
        record.streak = 4;
        record.achievements.insert("xp_100".to_string());
        record.last_modified = 1_700_000_000_000.0;
        record
    }

    /// Replace the ASCII byte at `index` with a different printable one
    fn flip(s: &str, index: usize) -> String {
        let mut bytes = s.as_bytes().to_vec();
        let i = index % bytes.len();
        bytes[i] = if bytes[i] == b'x' { b'y' } else { b'x' };
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_tag_deterministic_and_short() {
        let a = compute_tag(b"hello");
        assert_eq!(a, compute_tag(b"hello"));
        assert_eq!(a.len(), TAG_LEN);
        assert_ne!(a, compute_tag(b"hellp"));
        // Order sensitive
        assert_ne!(compute_tag(b"ab"), compute_tag(b"ba"));
    }

    #[test]
    fn test_round_trip() {
        let record = sample();
        let envelope = IntegrityEnvelope::seal(&record).unwrap();
        assert!(verify(&envelope));

        let raw = envelope.to_json().unwrap();
        assert!(verify_str(&raw));
        let reopened: ProgressRecord = IntegrityEnvelope::parse(&raw).unwrap().open().unwrap();
        assert_eq!(reopened, record);
    }

    #[test]
    fn test_malformed_is_false() {
        assert!(!verify_str(""));
        assert!(!verify_str("{not json"));
        assert!(!verify_str("{\"version\":2}"));
        assert!(!verify_str("null"));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut envelope = IntegrityEnvelope::seal(&sample()).unwrap();
        envelope.version = 1;
        assert_eq!(
            envelope.open::<ProgressRecord>(),
            Err(IntegrityError::UnsupportedVersion(1))
        );
    }

    #[test]
    fn test_checksum_mismatch_never_returns_record() {
        let mut envelope = IntegrityEnvelope::seal(&sample()).unwrap();
        envelope.record = envelope.record.replace("420", "9999");
        assert_eq!(envelope.open::<ProgressRecord>(), Err(IntegrityError::ChecksumMismatch));
    }

    proptest! {
        #[test]
        fn prop_record_byte_flip_detected(index in 0usize..4096) {
            let mut envelope = IntegrityEnvelope::seal(&sample()).unwrap();
            envelope.record = flip(&envelope.record, index);
            prop_assert!(!verify(&envelope));
        }

        #[test]
        fn prop_checksum_byte_flip_detected(index in 0usize..TAG_LEN) {
            let mut envelope = IntegrityEnvelope::seal(&sample()).unwrap();
            envelope.checksum = flip(&envelope.checksum, index);
            prop_assert!(!verify(&envelope));
        }
    }
}
