//! Legacy record layouts
//!
//! Older builds stored the record as bare JSON under `progress_<CODE>`:
//! - v0: no checksum at all
//! - v1: a sibling `progress_<CODE>_checksum` key holding the tag of that JSON
//!
//! Field names drifted too (`xp`/`totalXP`, `badges`/`achievements`), so the
//! upgrader reads a loose `serde_json::Value` and keeps whatever is usable.

use serde_json::Value;

use super::envelope::{IntegrityError, compute_tag};
use crate::achievements::Catalog;
use crate::platform::Storage;
use crate::progress::{AccessCode, ProgressRecord};

/// Detected legacy layout
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyLayout {
    /// v0: bare record, no checksum
    Bare { raw: String },
    /// v1: bare record plus sibling checksum
    SiblingChecksum { raw: String, checksum: String },
}

impl LegacyLayout {
    pub fn version(&self) -> u32 {
        match self {
            LegacyLayout::Bare { .. } => 0,
            LegacyLayout::SiblingChecksum { .. } => 1,
        }
    }
}

pub fn legacy_key(code: &AccessCode) -> String {
    format!("progress_{}", code)
}

pub fn legacy_checksum_key(code: &AccessCode) -> String {
    format!("progress_{}_checksum", code)
}

/// Look for a legacy layout for `code`
pub fn detect(storage: &dyn Storage, code: &AccessCode) -> Option<LegacyLayout> {
    let raw = storage.get_item(&legacy_key(code)).ok().flatten()?;
    match storage.get_item(&legacy_checksum_key(code)).ok().flatten() {
        Some(checksum) => Some(LegacyLayout::SiblingChecksum { raw, checksum }),
        None => Some(LegacyLayout::Bare { raw }),
    }
}

/// Remove every legacy key for `code`
pub fn clear(storage: &dyn Storage, code: &AccessCode) {
    for key in [legacy_key(code), legacy_checksum_key(code)] {
        if let Err(e) = storage.remove_item(&key) {
            log::warn!("Could not remove legacy key {}: {}", key, e);
        }
    }
}

/// Upgrade a legacy layout into a current record.
///
/// Each step verifies what its version could verify, then hands off to the
/// next older one.
pub fn upgrade(
    layout: &LegacyLayout,
    code: &AccessCode,
    catalog: Catalog,
    xp_ceiling: u64,
) -> Result<ProgressRecord, IntegrityError> {
    match layout {
        LegacyLayout::SiblingChecksum { raw, checksum } => {
            if compute_tag(raw.as_bytes()) != checksum.trim() {
                return Err(IntegrityError::ChecksumMismatch);
            }
            upgrade_bare(raw, code, catalog, xp_ceiling)
        }
        LegacyLayout::Bare { raw } => upgrade_bare(raw, code, catalog, xp_ceiling),
    }
}

fn upgrade_bare(
    raw: &str,
    code: &AccessCode,
    catalog: Catalog,
    xp_ceiling: u64,
) -> Result<ProgressRecord, IntegrityError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| IntegrityError::Malformed(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| IntegrityError::Malformed("legacy record is not an object".into()))?;

    let mut record = ProgressRecord::new(code.clone());

    let xp = ["totalXP", "total_xp", "xp"]
        .iter()
        .find_map(|k| obj.get(*k))
        .and_then(non_negative);
    record.add_xp(xp.unwrap_or(0), xp_ceiling);

    if let Some(streak) = obj.get("streak").and_then(non_negative) {
        record.streak = streak.min(u32::MAX as u64) as u32;
    }

    let ids = ["achievements", "badges"]
        .iter()
        .find_map(|k| obj.get(*k))
        .and_then(Value::as_array);
    for id in ids.into_iter().flatten().filter_map(Value::as_str) {
        if catalog.contains(id) {
            record.achievements.insert(id.to_string());
        } else {
            log::debug!("Dropping unknown legacy achievement {}", id);
        }
    }

    Ok(record)
}

/// Accept finite, non-negative JSON numbers (legacy builds wrote floats)
fn non_negative(value: &Value) -> Option<u64> {
    let n = value.as_f64()?;
    (n.is_finite() && n >= 0.0).then(|| n.floor() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryStorage;

    fn code() -> AccessCode {
        AccessCode::parse("AB12").unwrap()
    }

    #[test]
    fn test_detect_layouts() {
        let storage = MemoryStorage::new();
        assert!(detect(&storage, &code()).is_none());

        storage.set_item("progress_AB12", "{\"xp\":5}").unwrap();
        assert_eq!(detect(&storage, &code()).unwrap().version(), 0);

        storage.set_item("progress_AB12_checksum", "abc").unwrap();
        assert_eq!(detect(&storage, &code()).unwrap().version(), 1);

        clear(&storage, &code());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_upgrade_bare_field_aliases() {
        let layout = LegacyLayout::Bare {
            raw: r#"{"xp": 260.7, "streak": 2, "badges": ["xp_100", "bogus"]}"#.into(),
        };
        let record = upgrade(&layout, &code(), Catalog::standard(), 1_000_000).unwrap();
        assert_eq!(record.total_xp, 260);
        assert_eq!(record.level, 3);
        assert_eq!(record.streak, 2);
        assert_eq!(record.achievements.len(), 1);
        assert!(record.has_achievement("xp_100"));
    }

    #[test]
    fn test_upgrade_negative_xp_ignored() {
        let layout = LegacyLayout::Bare {
            raw: r#"{"totalXP": -50}"#.into(),
        };
        let record = upgrade(&layout, &code(), Catalog::standard(), 1_000_000).unwrap();
        assert_eq!(record.total_xp, 0);
    }

    #[test]
    fn test_upgrade_sibling_checksum() {
        let raw = r#"{"totalXP": 120, "achievements": []}"#.to_string();
        let good = LegacyLayout::SiblingChecksum {
            checksum: compute_tag(raw.as_bytes()),
            raw: raw.clone(),
        };
        assert_eq!(
            upgrade(&good, &code(), Catalog::standard(), 1_000_000)
                .unwrap()
                .total_xp,
            120
        );

        let bad = LegacyLayout::SiblingChecksum {
            checksum: "0000000000000000".into(),
            raw,
        };
        assert_eq!(
            upgrade(&bad, &code(), Catalog::standard(), 1_000_000),
            Err(IntegrityError::ChecksumMismatch)
        );
    }

    #[test]
    fn test_upgrade_malformed() {
        let layout = LegacyLayout::Bare { raw: "[1,2]".into() };
        assert!(matches!(
            upgrade(&layout, &code(), Catalog::standard(), 1_000_000),
            Err(IntegrityError::Malformed(_))
        ));
    }
}
