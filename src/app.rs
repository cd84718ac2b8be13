//! Composition root
//!
//! One `ProgressApp` per page. It owns the store, session manager,
//! achievement engine and rate limiter, and applies the anti-abuse policy:
//! - repeatable awards are rate-limited per action key, for the life of the page
//! - implausibly fast lessons and rounds are flagged and award nothing
//! - round timestamps from the future are flagged the same way
//!
//! Every public method has a defined fallback value; nothing here panics on
//! bad input or missing storage.

use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::Serialize;

use crate::achievements::{AchievementEngine, AchievementInfo, Catalog, PollTimer};
use crate::guard::{RateLimiter, is_plausible_duration, is_storage_suspicious};
use crate::highscores::HighScores;
use crate::persistence::ProgressStore;
use crate::platform::{Clock, SharedClock, SharedStorage, Storage};
use crate::progress::{AccessCode, ProgressRecord, level_progress};
use crate::session::SessionManager;
use crate::settings::Settings;
use crate::sim::{GameRound, RoundSummary, round_xp};

/// Result of an award attempt
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Outcome {
    /// Action went through the rate limiter and a session was active
    pub accepted: bool,
    /// Too fast to be real; nothing was awarded
    pub flagged: bool,
    pub xp_awarded: u64,
    /// Personal-best rank, for rounds
    pub rank: Option<usize>,
    pub unlocked: Vec<AchievementInfo>,
}

/// Progress as the UI renders it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub code: String,
    pub total_xp: u64,
    pub level: u32,
    pub xp_into_level: u64,
    pub xp_for_next_level: Option<u64>,
    pub streak: u32,
    pub achievements: Vec<String>,
}

impl From<&ProgressRecord> for Snapshot {
    fn from(record: &ProgressRecord) -> Self {
        let (xp_into_level, xp_for_next_level) = level_progress(record.total_xp);
        Self {
            code: record.code.to_string(),
            total_xp: record.total_xp,
            level: record.level,
            xp_into_level,
            xp_for_next_level,
            streak: record.streak,
            achievements: record.achievements.iter().cloned().collect(),
        }
    }
}

/// Diagnostic storage usage report
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StorageReport {
    pub used_bytes: usize,
    pub suspicious: bool,
    /// Storage fell back to memory (nothing persists)
    pub memory_only: bool,
}

pub struct ProgressApp {
    settings: Settings,
    storage: SharedStorage,
    clock: SharedClock,
    store: ProgressStore,
    sessions: SessionManager,
    engine: AchievementEngine,
    limiter: RateLimiter,
    poll: PollTimer,
}

impl ProgressApp {
    /// Build with the standard catalog
    pub fn init(storage: SharedStorage, clock: SharedClock, settings: Settings) -> Self {
        Self::with_catalog(storage, clock, settings, Catalog::standard())
    }

    pub fn with_catalog(
        storage: SharedStorage,
        clock: SharedClock,
        settings: Settings,
        catalog: Catalog,
    ) -> Self {
        let settings = settings.sanitized();
        let store = ProgressStore::new(storage.clone(), clock.clone(), catalog, settings.xp_ceiling);
        let sessions = SessionManager::new(storage.clone(), clock.clone());
        let limiter = RateLimiter::new(
            clock.clone(),
            settings.max_submissions,
            settings.submission_window_ms,
        );
        let mut poll = PollTimer::new(settings.poll_interval_ms);
        poll.arm(clock.now_ms());

        let app = Self {
            settings,
            storage,
            clock,
            store,
            sessions,
            engine: AchievementEngine::new(catalog),
            limiter,
            poll,
        };

        // Startup migrations are one-shot and idempotent
        app.sessions.migrate_old_session();
        if let Some(code) = app.sessions.get_session() {
            app.store.migrate_legacy(&code);
            log::info!("Resumed session for {}", code);
        }
        app
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub fn catalog(&self) -> Vec<AchievementInfo> {
        self.engine.catalog().infos()
    }

    /// Fresh access code for onboarding
    pub fn generate_code(seed: u64) -> AccessCode {
        AccessCode::generate(&mut Pcg32::seed_from_u64(seed))
    }

    // === Session ===

    pub fn login(&mut self, raw_code: &str) -> bool {
        if !self.sessions.create_session(raw_code, &self.store) {
            return false;
        }
        if let Some(code) = self.sessions.get_session() {
            self.store.record_activity(&code, self.clock.now_ms());
            self.engine.check_all(&self.store, &code);
        }
        true
    }

    /// End the session. Rate windows survive so a re-login can't reset them.
    pub fn logout(&mut self) {
        self.sessions.logout();
    }

    pub fn active_code(&self) -> Option<AccessCode> {
        self.sessions.get_session()
    }

    /// Verified progress for the active session
    pub fn progress(&self) -> Option<ProgressRecord> {
        let code = self.active_code()?;
        Some(self.store.load_or_reset(&code))
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.progress().as_ref().map(Snapshot::from)
    }

    // === Achievements ===

    pub fn set_notification_callback(&mut self, callback: impl FnMut(&AchievementInfo) + 'static) {
        self.engine.set_notification_callback(callback);
    }

    /// Eager evaluation for the active session
    pub fn check_achievements(&mut self) -> Vec<AchievementInfo> {
        match self.active_code() {
            Some(code) => self.engine.check_all(&self.store, &code),
            None => Vec::new(),
        }
    }

    /// Drive timers; runs the safety-net poll when due
    pub fn tick(&mut self) -> Vec<AchievementInfo> {
        if self.poll.fire_if_due(self.clock.now_ms()) {
            log::debug!("Achievement poll");
            return self.check_achievements();
        }
        Vec::new()
    }

    // === Awards ===

    /// Award XP for a repeatable action. Negative or non-finite deltas are
    /// rejected; so are attempts over the rate limit.
    pub fn award_xp(&mut self, action_key: &str, delta: f64) -> Outcome {
        let Some(delta) = xp_delta(delta) else {
            log::warn!("Rejected XP delta {}", delta);
            return Outcome::default();
        };
        let Some(code) = self.active_code() else {
            return Outcome::default();
        };
        if !self.limiter.allow(action_key) {
            log::info!("Rate limited: {}", action_key);
            return Outcome::default();
        }

        let before = self.store.load_or_reset(&code).total_xp;
        let after = self.store.add_xp(&code, delta).total_xp;
        self.store.record_activity(&code, self.clock.now_ms());
        Outcome {
            accepted: true,
            xp_awarded: after - before,
            unlocked: self.engine.check_all(&self.store, &code),
            ..Outcome::default()
        }
    }

    /// A lesson finished. Too-fast completions are flagged and award nothing.
    pub fn complete_lesson(&mut self, lesson_id: &str, started_at: f64, xp: u64) -> Outcome {
        let Some(code) = self.active_code() else {
            return Outcome::default();
        };
        if !self.limiter.allow(&format!("lesson:{}", lesson_id)) {
            return Outcome::default();
        }

        let now = self.clock.now_ms();
        if !is_plausible_duration(started_at, now, self.settings.min_lesson_ms) {
            log::warn!("Lesson {} finished implausibly fast, not awarded", lesson_id);
            return Outcome {
                accepted: true,
                flagged: true,
                ..Outcome::default()
            };
        }

        let before = self.store.load_or_reset(&code).total_xp;
        self.store
            .update_stats(&code, |s| s.lessons_completed = s.lessons_completed.saturating_add(1));
        let after = self.store.add_xp(&code, xp).total_xp;
        self.store.record_activity(&code, now);
        Outcome {
            accepted: true,
            xp_awarded: after - before,
            unlocked: self.engine.check_all(&self.store, &code),
            ..Outcome::default()
        }
    }

    /// New round with the configured lives/hints
    pub fn new_round(&self, game: &str) -> GameRound {
        GameRound::new(game, self.settings.round_rules())
    }

    /// Flush a finished round into persisted progress.
    ///
    /// The summary comes from the page, so only its duration is trusted;
    /// streak and personal-best timestamps use the app clock.
    pub fn finish_round(&mut self, summary: &RoundSummary) -> Outcome {
        let Some(code) = self.active_code() else {
            return Outcome::default();
        };
        if !self.limiter.allow(&format!("round:{}", summary.game)) {
            return Outcome::default();
        }
        let now = self.clock.now_ms();
        if summary.finished_at > now {
            log::warn!("Round of {} finished in the future, not awarded", summary.game);
            return Outcome {
                accepted: true,
                flagged: true,
                ..Outcome::default()
            };
        }
        if !is_plausible_duration(summary.started_at, summary.finished_at, self.settings.min_round_ms) {
            log::warn!("Round of {} finished implausibly fast, not awarded", summary.game);
            return Outcome {
                accepted: true,
                flagged: true,
                ..Outcome::default()
            };
        }

        let before = self.store.load_or_reset(&code).total_xp;
        self.store.update_stats(&code, |s| {
            s.rounds_played = s.rounds_played.saturating_add(1);
            s.hints_used = s.hints_used.saturating_add(summary.hints_used);
            s.best_combo = s.best_combo.max(summary.best_combo);
            if summary.won {
                s.rounds_won = s.rounds_won.saturating_add(1);
                if summary.lives_lost == 0 {
                    s.perfect_rounds = s.perfect_rounds.saturating_add(1);
                }
            }
        });
        let xp = round_xp(summary.score, summary.won, self.settings.round_xp_cap);
        let after = self.store.add_xp(&code, xp).total_xp;
        self.store.record_activity(&code, now);

        let rank = if summary.won {
            let mut bests = HighScores::load(self.storage.as_ref(), &code, &summary.game);
            let rank = bests.add_score(summary.score, summary.best_combo, now);
            if rank.is_some() {
                bests.save(self.storage.as_ref(), &code, &summary.game);
            }
            rank
        } else {
            None
        };

        Outcome {
            accepted: true,
            flagged: false,
            xp_awarded: after - before,
            rank,
            unlocked: self.engine.check_all(&self.store, &code),
        }
    }

    pub fn personal_bests(&self, game: &str) -> HighScores {
        match self.active_code() {
            Some(code) => HighScores::load(self.storage.as_ref(), &code, game),
            None => HighScores::new(),
        }
    }

    // === Lifecycle ===

    /// Explicit progress reset for the active learner
    pub fn reset_progress(&mut self) -> bool {
        let Some(code) = self.active_code() else {
            return false;
        };
        self.store.reset(&code);
        true
    }

    /// Clear in-memory state (rate windows, poll timer, notification sink)
    pub fn reset(&mut self) {
        self.limiter.clear();
        self.engine.clear_notification_callback();
        self.poll.arm(self.clock.now_ms());
    }

    /// Component teardown: no callback fires after this
    pub fn teardown(&mut self) {
        self.engine.clear_notification_callback();
        self.poll.disarm();
        log::debug!("Progress app torn down");
    }

    pub fn storage_report(&self) -> StorageReport {
        let used_bytes = self.storage.used_bytes().unwrap_or(0);
        let suspicious = is_storage_suspicious(used_bytes, self.settings.storage_warn_bytes);
        if suspicious {
            log::warn!("Storage usage unusually high: {} bytes", used_bytes);
        }
        StorageReport {
            used_bytes,
            suspicious,
            memory_only: self.storage.is_degraded(),
        }
    }
}

/// Validate an XP amount from the UI
fn xp_delta(delta: f64) -> Option<u64> {
    (delta.is_finite() && delta >= 0.0).then(|| delta.floor() as u64)
}
