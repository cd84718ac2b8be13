//! Tunables for progress, anti-abuse checks and rounds
//!
//! Persisted next to the progress data in the same checksummed envelope,
//! since the anti-abuse thresholds live here. An edited or unsealed value
//! loads as defaults. Missing fields fall back to defaults so older saved
//! settings keep loading.

use serde::{Deserialize, Serialize};

use crate::persistence::{IntegrityEnvelope, KEY_PREFIX};
use crate::platform::Storage;
use crate::sim::RoundRules;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Progress ===
    /// Hard cap on total XP
    pub xp_ceiling: u64,
    /// Most XP a single round can award
    pub round_xp_cap: u64,

    // === Rate limiting ===
    /// Attempts allowed per action key inside the window
    pub max_submissions: usize,
    /// Trailing window length (ms)
    pub submission_window_ms: f64,

    // === Timing ===
    /// Shortest believable round (ms)
    pub min_round_ms: f64,
    /// Shortest believable lesson (ms)
    pub min_lesson_ms: f64,

    // === Achievements ===
    /// Safety-net polling period (ms)
    pub poll_interval_ms: f64,

    // === Diagnostics ===
    /// Storage usage that gets flagged (bytes)
    pub storage_warn_bytes: usize,

    // === Rounds ===
    pub round_lives: u32,
    pub round_hints: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            xp_ceiling: 1_000_000,
            round_xp_cap: 100,

            max_submissions: 3,
            submission_window_ms: 5_000.0,

            min_round_ms: 3_000.0,
            min_lesson_ms: 10_000.0,

            poll_interval_ms: 30_000.0,

            // Browsers give ~5 MB per origin
            storage_warn_bytes: 4_000_000,

            round_lives: 3,
            round_hints: 3,
        }
    }
}

impl Settings {
    /// Storage key
    pub fn storage_key() -> String {
        format!("{}:settings", KEY_PREFIX)
    }

    /// Starting resources for new rounds
    pub fn round_rules(&self) -> RoundRules {
        RoundRules {
            lives: self.round_lives.max(1),
            hints: self.round_hints,
        }
    }

    /// Replace unusable values with defaults
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        let fix = |value: f64, default: f64| {
            if value.is_finite() && value >= 0.0 { value } else { default }
        };
        self.submission_window_ms = fix(self.submission_window_ms, defaults.submission_window_ms);
        self.min_round_ms = fix(self.min_round_ms, defaults.min_round_ms);
        self.min_lesson_ms = fix(self.min_lesson_ms, defaults.min_lesson_ms);
        self.poll_interval_ms = fix(self.poll_interval_ms, defaults.poll_interval_ms);
        if self.max_submissions == 0 {
            self.max_submissions = defaults.max_submissions;
        }
        self
    }

    /// Load settings from storage
    pub fn load(storage: &dyn Storage) -> Self {
        if let Ok(Some(json)) = storage.get_item(&Self::storage_key()) {
            match IntegrityEnvelope::parse(&json).and_then(|envelope| envelope.open::<Settings>()) {
                Ok(settings) => {
                    log::info!("Loaded settings from storage");
                    return settings.sanitized();
                }
                Err(e) => log::warn!("Stored settings rejected ({}), using defaults", e),
            }
        }

        log::info!("Using default settings");
        Self::default()
    }

    /// Save settings to storage
    pub fn save(&self, storage: &dyn Storage) {
        if let Ok(json) = IntegrityEnvelope::seal(self).and_then(|envelope| envelope.to_json()) {
            match storage.set_item(&Self::storage_key(), &json) {
                Ok(()) => log::info!("Settings saved"),
                Err(e) => log::warn!("Settings not saved: {}", e),
            }
        }
    }
}
