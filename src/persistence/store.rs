//! Progress store: the only reader/writer of progress records
//!
//! Access discipline is always: read the full envelope, verify, mutate in
//! memory, write the full envelope back in one `set_item`.

use super::KEY_PREFIX;
use super::envelope::{IntegrityEnvelope, IntegrityError};
use super::migration;
use crate::achievements::Catalog;
use crate::platform::{Clock, SharedClock, SharedStorage, Storage, StorageError, day_index};
use crate::progress::{AccessCode, ActivityStats, ProgressRecord, level_for};

/// Storage key of the current-format record
pub fn record_key(code: &AccessCode) -> String {
    format!("{}:record:{}", KEY_PREFIX, code)
}

pub struct ProgressStore {
    storage: SharedStorage,
    clock: SharedClock,
    catalog: Catalog,
    xp_ceiling: u64,
}

impl ProgressStore {
    pub fn new(storage: SharedStorage, clock: SharedClock, catalog: Catalog, xp_ceiling: u64) -> Self {
        Self {
            storage,
            clock,
            catalog,
            xp_ceiling,
        }
    }

    pub fn catalog(&self) -> Catalog {
        self.catalog
    }

    pub fn xp_ceiling(&self) -> u64 {
        self.xp_ceiling
    }

    /// True if a current-format record exists for `code`
    pub fn exists(&self, code: &AccessCode) -> bool {
        matches!(self.storage.get_item(&record_key(code)), Ok(Some(_)))
    }

    /// Load and verify. A missing record yields a fresh (unsaved) one; an
    /// untrusted record yields an error, never its contents.
    ///
    /// XP above the current ceiling is clamped, not rejected: the ceiling is
    /// configuration and may have been lowered since the record was written.
    pub fn load(&self, code: &AccessCode) -> Result<ProgressRecord, IntegrityError> {
        let raw = match self.storage.get_item(&record_key(code)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(ProgressRecord::new(code.clone())),
            Err(e) => {
                log::warn!("Progress for {} unreadable ({}), starting fresh", code, e);
                return Ok(ProgressRecord::new(code.clone()));
            }
        };
        let mut record: ProgressRecord = IntegrityEnvelope::parse(&raw)?.open()?;
        self.validate(code, &record)?;
        if record.total_xp > self.xp_ceiling {
            log::info!(
                "Clamping {} xp for {} to ceiling {}",
                record.total_xp,
                code,
                self.xp_ceiling
            );
            record.total_xp = self.xp_ceiling;
            record.level = level_for(record.total_xp);
        }
        Ok(record)
    }

    /// [`load`](Self::load), discarding and reinitializing untrusted data
    pub fn load_or_reset(&self, code: &AccessCode) -> ProgressRecord {
        match self.load(code) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Discarding tampered progress for {}: {}", code, e);
                self.reset(code)
            }
        }
    }

    /// Structural checks that run after the checksum passed
    fn validate(&self, code: &AccessCode, record: &ProgressRecord) -> Result<(), IntegrityError> {
        if &record.code != code {
            return Err(IntegrityError::InvalidRecord(format!(
                "record belongs to {}",
                record.code
            )));
        }
        if record.level != level_for(record.total_xp) {
            return Err(IntegrityError::InvalidRecord(format!(
                "level {} does not match {} xp",
                record.level, record.total_xp
            )));
        }
        if let Some(id) = record.achievements.iter().find(|id| !self.catalog.contains(id)) {
            return Err(IntegrityError::InvalidRecord(format!("unknown achievement {}", id)));
        }
        if !record.last_modified.is_finite() {
            return Err(IntegrityError::InvalidRecord("bad timestamp".into()));
        }
        Ok(())
    }

    /// Recompute derived fields, seal and write in one operation
    pub fn save(&self, record: &mut ProgressRecord) -> Result<(), StorageError> {
        record.total_xp = record.total_xp.min(self.xp_ceiling);
        record.level = level_for(record.total_xp);
        record.achievements.retain(|id| self.catalog.contains(id));
        record.last_modified = self.clock.now_ms();

        let json = IntegrityEnvelope::seal(&*record)
            .and_then(|envelope| envelope.to_json())
            .map_err(|e| StorageError::Serialize(e.to_string()))?;
        self.storage.set_item(&record_key(&record.code), &json)
    }

    /// Load, apply `f`, save. Returns the saved record.
    fn update(&self, code: &AccessCode, f: impl FnOnce(&mut ProgressRecord)) -> ProgressRecord {
        let mut record = self.load_or_reset(code);
        f(&mut record);
        if let Err(e) = self.save(&mut record) {
            log::warn!("Failed to save progress for {}: {}", code, e);
        }
        record
    }

    /// Add XP (clamped at the ceiling). Negative amounts go through [`reset`](Self::reset).
    pub fn add_xp(&self, code: &AccessCode, delta: u64) -> ProgressRecord {
        let ceiling = self.xp_ceiling;
        self.update(code, |r| {
            let gained = r.add_xp(delta, ceiling);
            log::debug!("{} +{} xp (total {})", code, gained, r.total_xp);
        })
    }

    /// Unlock a catalog achievement; true only when newly added
    pub fn unlock_achievement(&self, code: &AccessCode, id: &str) -> bool {
        if !self.catalog.contains(id) {
            log::warn!("Rejected unknown achievement id {:?}", id);
            return false;
        }
        let mut record = self.load_or_reset(code);
        if !record.achievements.insert(id.to_string()) {
            return false;
        }
        if let Err(e) = self.save(&mut record) {
            log::warn!("Failed to save achievement {} for {}: {}", id, code, e);
        }
        true
    }

    /// Streak bookkeeping for activity at `now_ms`
    pub fn record_activity(&self, code: &AccessCode, now_ms: f64) -> ProgressRecord {
        match day_index(now_ms) {
            Some(day) => self.update(code, |r| r.touch_day(day)),
            None => self.load_or_reset(code),
        }
    }

    /// Apply `f` to the activity counters and save
    pub fn update_stats(&self, code: &AccessCode, f: impl FnOnce(&mut ActivityStats)) -> ProgressRecord {
        self.update(code, |r| f(&mut r.stats))
    }

    /// Explicit reset path: replace with a fresh record
    pub fn reset(&self, code: &AccessCode) -> ProgressRecord {
        let mut record = ProgressRecord::new(code.clone());
        if let Err(e) = self.save(&mut record) {
            log::warn!("Failed to write fresh progress for {}: {}", code, e);
        }
        log::info!("Progress reset for {}", code);
        record
    }

    /// Upgrade a legacy layout for `code` once. True if a record was migrated.
    pub fn migrate_legacy(&self, code: &AccessCode) -> bool {
        let Some(layout) = migration::detect(self.storage.as_ref(), code) else {
            return false;
        };

        if self.exists(code) {
            log::info!("Current progress exists for {}, dropping legacy copy", code);
            migration::clear(self.storage.as_ref(), code);
            return false;
        }

        let migrated = match migration::upgrade(&layout, code, self.catalog, self.xp_ceiling) {
            Ok(mut record) => match self.save(&mut record) {
                Ok(()) => {
                    log::info!(
                        "Migrated v{} progress for {} ({} xp)",
                        layout.version(),
                        code,
                        record.total_xp
                    );
                    true
                }
                Err(e) => {
                    // Keep the legacy keys so a later start can retry
                    log::warn!("Could not write migrated progress for {}: {}", code, e);
                    return false;
                }
            },
            Err(e) => {
                log::warn!("Discarding legacy progress for {}: {}", code, e);
                false
            }
        };

        migration::clear(self.storage.as_ref(), code);
        migrated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::compute_tag;
    use crate::platform::{ManualClock, MemoryStorage};
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::rc::Rc;

    fn setup() -> (Rc<MemoryStorage>, Rc<ManualClock>, ProgressStore) {
        let storage = Rc::new(MemoryStorage::new());
        let clock = Rc::new(ManualClock::new(1_700_000_000_000.0));
        let store = ProgressStore::new(storage.clone(), clock.clone(), Catalog::standard(), 100_000);
        (storage, clock, store)
    }

    fn code() -> AccessCode {
        AccessCode::parse("AB12").unwrap()
    }

    #[test]
    fn test_missing_record_is_fresh() {
        let (storage, _, store) = setup();
        let record = store.load(&code()).unwrap();
        assert_eq!(record.total_xp, 0);
        assert_eq!(record.level, 1);
        assert!(record.achievements.is_empty());
        // Loading alone writes nothing
        assert!(storage.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let (_, _, store) = setup();
        let mut record = ProgressRecord::new(code());
        record.total_xp = 640;
        record.level = 99; // recomputed on save
        record.streak = 3;
        record.achievements.insert("xp_500".into());
        store.save(&mut record).unwrap();

        assert_eq!(record.level, 4);
        assert_eq!(record.last_modified, 1_700_000_000_000.0);
        assert_eq!(store.load(&code()).unwrap(), record);
    }

    #[test]
    fn test_tampered_record_rejected_and_reset() {
        let (storage, _, store) = setup();
        store.add_xp(&code(), 300);

        let key = record_key(&code());
        let raw = storage.get_item(&key).unwrap().unwrap();
        let forged = raw.replace("\\\"total_xp\\\":300", "\\\"total_xp\\\":9000");
        assert_ne!(forged, raw);
        storage.set_item(&key, &forged).unwrap();

        assert_eq!(store.load(&code()), Err(IntegrityError::ChecksumMismatch));
        let reset = store.load_or_reset(&code());
        assert_eq!(reset.total_xp, 0);
        // The fresh record was persisted
        assert_eq!(store.load(&code()).unwrap().total_xp, 0);
    }

    #[test]
    fn test_consistent_but_invalid_record_rejected() {
        let (storage, _, store) = setup();
        // Correct checksum over a record whose level disagrees with its XP
        let mut record = ProgressRecord::new(code());
        record.total_xp = 5_000;
        let envelope = IntegrityEnvelope::seal(&record).unwrap();
        storage
            .set_item(&record_key(&code()), &envelope.to_json().unwrap())
            .unwrap();
        assert!(matches!(store.load(&code()), Err(IntegrityError::InvalidRecord(_))));
    }

    #[test]
    fn test_record_under_wrong_code_rejected() {
        let (storage, _, store) = setup();
        let other = AccessCode::parse("ZZ99").unwrap();
        store.add_xp(&other, 10);
        let raw = storage.get_item(&record_key(&other)).unwrap().unwrap();
        storage.set_item(&record_key(&code()), &raw).unwrap();
        assert!(matches!(store.load(&code()), Err(IntegrityError::InvalidRecord(_))));
    }

    #[test]
    fn test_add_xp_clamps_at_ceiling() {
        let (_, _, store) = setup();
        store.add_xp(&code(), 90_000);
        let record = store.add_xp(&code(), 90_000);
        assert_eq!(record.total_xp, 100_000);
        assert_eq!(store.load(&code()).unwrap().total_xp, 100_000);
    }

    #[test]
    fn test_lowered_ceiling_clamps_instead_of_wiping() {
        let (storage, clock, store) = setup();
        store.add_xp(&code(), 5_000);

        let lowered = ProgressStore::new(storage.clone(), clock, Catalog::standard(), 1_000);
        let record = lowered.load(&code()).unwrap();
        assert_eq!(record.total_xp, 1_000);
        assert_eq!(record.level, level_for(1_000));
        assert_eq!(lowered.load_or_reset(&code()).total_xp, 1_000);
        // Next write persists the clamped value
        assert_eq!(lowered.add_xp(&code(), 10).total_xp, 1_000);
        assert_eq!(store.load(&code()).unwrap().total_xp, 1_000);
    }

    #[test]
    fn test_unlock_rejects_unknown() {
        let (_, _, store) = setup();
        assert!(!store.unlock_achievement(&code(), "made_up"));
        assert!(store.load(&code()).unwrap().achievements.is_empty());
    }

    #[test]
    fn test_record_activity_builds_streak() {
        let (_, clock, store) = setup();
        let day = 86_400_000.0;
        store.record_activity(&code(), clock.now_ms());
        store.record_activity(&code(), clock.now_ms() + day);
        let record = store.record_activity(&code(), clock.now_ms() + 2.0 * day);
        assert_eq!(record.streak, 3);
        assert_eq!(store.record_activity(&code(), f64::NAN).streak, 3);
    }

    #[test]
    fn test_update_stats() {
        let (_, _, store) = setup();
        store.update_stats(&code(), |s| s.rounds_won += 2);
        assert_eq!(store.load(&code()).unwrap().stats.rounds_won, 2);
    }

    #[test]
    fn test_migrate_v0_once() {
        let (storage, _, store) = setup();
        storage
            .set_item("progress_AB12", r#"{"xp": 150, "badges": ["xp_100"]}"#)
            .unwrap();

        assert!(store.migrate_legacy(&code()));
        let record = store.load(&code()).unwrap();
        assert_eq!(record.total_xp, 150);
        assert!(record.has_achievement("xp_100"));
        assert_eq!(storage.get_item("progress_AB12").unwrap(), None);

        // Second run is a no-op
        assert!(!store.migrate_legacy(&code()));
        assert_eq!(store.load(&code()).unwrap(), record);
    }

    #[test]
    fn test_migrate_v1_bad_checksum_discarded() {
        let (storage, _, store) = setup();
        storage.set_item("progress_AB12", r#"{"xp": 150}"#).unwrap();
        storage.set_item("progress_AB12_checksum", "deadbeef").unwrap();

        assert!(!store.migrate_legacy(&code()));
        assert!(storage.is_empty());
        assert_eq!(store.load(&code()).unwrap().total_xp, 0);
    }

    #[test]
    fn test_migrate_v1_good_checksum() {
        let (storage, _, store) = setup();
        let raw = r#"{"totalXP": 75}"#;
        storage.set_item("progress_AB12", raw).unwrap();
        storage
            .set_item("progress_AB12_checksum", &compute_tag(raw.as_bytes()))
            .unwrap();

        assert!(store.migrate_legacy(&code()));
        assert_eq!(store.load(&code()).unwrap().total_xp, 75);
    }

    #[test]
    fn test_migrate_skips_when_current_exists() {
        let (storage, _, store) = setup();
        store.add_xp(&code(), 40);
        storage.set_item("progress_AB12", r#"{"xp": 9999}"#).unwrap();

        assert!(!store.migrate_legacy(&code()));
        assert_eq!(store.load(&code()).unwrap().total_xp, 40);
        assert_eq!(storage.get_item("progress_AB12").unwrap(), None);
    }

    proptest! {
        #[test]
        fn prop_unlock_idempotent(ids in proptest::collection::vec(
            prop_oneof![
                Just("xp_100"), Just("streak_3"), Just("first_win"), Just("bogus"), Just("")
            ],
            0..20,
        )) {
            let (_, _, store) = setup();
            for id in &ids {
                store.unlock_achievement(&code(), id);
            }
            let expected: BTreeSet<String> = ids
                .iter()
                .filter(|id| Catalog::standard().contains(id))
                .map(|id| id.to_string())
                .collect();
            prop_assert_eq!(store.load(&code()).unwrap().achievements, expected);
        }

        #[test]
        fn prop_xp_never_decreases(deltas in proptest::collection::vec(0u64..50_000, 1..10)) {
            let (_, _, store) = setup();
            let mut last = 0;
            for delta in deltas {
                let total = store.add_xp(&code(), delta).total_xp;
                prop_assert!(total >= last);
                prop_assert!(total <= 100_000);
                last = total;
            }
        }
    }
}
