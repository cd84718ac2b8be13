//! Learner progress record and the pure functions derived from it

use std::collections::BTreeSet;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::consts::{ACCESS_CODE_LEN, LEVEL_THRESHOLDS};

/// Short learner access code: fixed length, ASCII alphanumeric, upper case
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessCode(String);

impl AccessCode {
    /// Parse and normalize a user-typed code; `None` if malformed
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.len() != ACCESS_CODE_LEN || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self(trimmed.to_ascii_uppercase()))
    }

    /// Random code for onboarding
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        let code = (0..ACCESS_CODE_LEN)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AccessCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid access code {:?}", value))
    }
}

impl From<AccessCode> for String {
    fn from(code: AccessCode) -> Self {
        code.0
    }
}

/// Level for a given XP total (1-based)
pub fn level_for(total_xp: u64) -> u32 {
    LEVEL_THRESHOLDS
        .iter()
        .filter(|&&threshold| total_xp >= threshold)
        .count()
        .max(1) as u32
}

/// Progress within the current level: (xp into level, xp needed for next).
/// At max level the second value is `None`.
pub fn level_progress(total_xp: u64) -> (u64, Option<u64>) {
    let level = level_for(total_xp) as usize;
    let floor = LEVEL_THRESHOLDS[level - 1];
    let next = LEVEL_THRESHOLDS.get(level).map(|next| next - floor);
    (total_xp - floor, next)
}

/// Activity counters the achievement predicates read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityStats {
    pub rounds_played: u32,
    pub rounds_won: u32,
    /// Rounds won without losing a life
    pub perfect_rounds: u32,
    pub best_combo: u32,
    pub hints_used: u32,
    pub lessons_completed: u32,
}

/// Canonical progress for one learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub code: AccessCode,
    pub total_xp: u64,
    /// Derived from `total_xp`; rewritten on every save
    pub level: u32,
    pub streak: u32,
    pub achievements: BTreeSet<String>,
    /// Unix ms of the last save
    pub last_modified: f64,
    /// Day index of the last recorded activity
    #[serde(default)]
    pub last_active_day: Option<u32>,
    #[serde(default)]
    pub stats: ActivityStats,
}

impl ProgressRecord {
    /// Fresh record: 0 XP, level 1, nothing unlocked
    pub fn new(code: AccessCode) -> Self {
        Self {
            code,
            total_xp: 0,
            level: 1,
            streak: 0,
            achievements: BTreeSet::new(),
            last_modified: 0.0,
            last_active_day: None,
            stats: ActivityStats::default(),
        }
    }

    /// Add XP, saturating at `ceiling`. Returns the XP actually gained.
    pub fn add_xp(&mut self, delta: u64, ceiling: u64) -> u64 {
        let before = self.total_xp;
        self.total_xp = self.total_xp.saturating_add(delta).min(ceiling.max(before));
        self.level = level_for(self.total_xp);
        self.total_xp - before
    }

    /// Streak update for activity on `day`
    pub fn touch_day(&mut self, day: u32) {
        self.streak = match self.last_active_day {
            Some(last) if last == day => self.streak.max(1),
            Some(last) if last.checked_add(1) == Some(day) => self.streak.saturating_add(1),
            // Clock moved backwards: keep the streak, don't rewind the day
            Some(last) if day < last => return,
            _ => 1,
        };
        self.last_active_day = Some(day);
    }

    pub fn has_achievement(&self, id: &str) -> bool {
        self.achievements.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn code() -> AccessCode {
        AccessCode::parse("AB12").unwrap()
    }

    #[test]
    fn test_access_code_parse() {
        assert_eq!(AccessCode::parse("ab12").unwrap().as_str(), "AB12");
        assert_eq!(AccessCode::parse(" XY9Z ").unwrap().as_str(), "XY9Z");
        assert!(AccessCode::parse("").is_none());
        assert!(AccessCode::parse("AB1").is_none());
        assert!(AccessCode::parse("AB123").is_none());
        assert!(AccessCode::parse("AB-2").is_none());
        assert!(AccessCode::parse("ÄB12").is_none());
    }

    #[test]
    fn test_access_code_generate_is_valid_and_seeded() {
        let mut rng1 = Pcg32::seed_from_u64(7);
        let mut rng2 = Pcg32::seed_from_u64(7);
        let a = AccessCode::generate(&mut rng1);
        let b = AccessCode::generate(&mut rng2);
        assert_eq!(a, b);
        assert_eq!(AccessCode::parse(a.as_str()), Some(a));
    }

    #[test]
    fn test_access_code_serde_rejects_malformed() {
        assert!(serde_json::from_str::<AccessCode>("\"AB12\"").is_ok());
        assert!(serde_json::from_str::<AccessCode>("\"nope!\"").is_err());
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(level_for(0), 1);
        assert_eq!(level_for(99), 1);
        assert_eq!(level_for(100), 2);
        assert_eq!(level_for(250), 3);
        assert_eq!(level_for(10_999), 9);
        assert_eq!(level_for(11_000), 10);
        assert_eq!(level_for(u64::MAX), crate::consts::MAX_LEVEL);
    }

    #[test]
    fn test_level_deterministic() {
        for xp in [0, 1, 100, 4321, 11_000, 999_999] {
            assert_eq!(level_for(xp), level_for(xp));
        }
    }

    #[test]
    fn test_level_progress() {
        assert_eq!(level_progress(0), (0, Some(100)));
        assert_eq!(level_progress(150), (50, Some(150)));
        assert_eq!(level_progress(12_000), (1_000, None));
    }

    #[test]
    fn test_add_xp_clamps() {
        let mut record = ProgressRecord::new(code());
        assert_eq!(record.add_xp(150, 1_000), 150);
        assert_eq!(record.level, 2);
        assert_eq!(record.add_xp(5_000, 1_000), 850);
        assert_eq!(record.total_xp, 1_000);
        assert_eq!(record.add_xp(u64::MAX, 1_000), 0);
    }

    #[test]
    fn test_streak() {
        let mut record = ProgressRecord::new(code());
        record.touch_day(100);
        assert_eq!(record.streak, 1);
        record.touch_day(100);
        assert_eq!(record.streak, 1);
        record.touch_day(101);
        record.touch_day(102);
        assert_eq!(record.streak, 3);
        // Backwards clock is ignored
        record.touch_day(90);
        assert_eq!(record.streak, 3);
        assert_eq!(record.last_active_day, Some(102));
        // Gap resets
        record.touch_day(110);
        assert_eq!(record.streak, 1);
    }

    #[test]
    fn test_streak_at_last_day_index() {
        let mut record = ProgressRecord::new(code());
        record.touch_day(u32::MAX);
        record.touch_day(u32::MAX);
        assert_eq!(record.streak, 1);
        record.touch_day(0);
        assert_eq!(record.last_active_day, Some(u32::MAX));
    }
}
