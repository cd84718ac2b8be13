//! Per-minigame round state
//!
//! One `GameRound` is owned by one minigame instance. It never touches
//! storage: the owner receives a [`RoundSummary`] through the won/lost
//! callbacks and decides what to persist.

use serde::{Deserialize, Serialize};

use super::scoring::combo_bonus;

/// How long feedback messages stay visible (ms)
pub const FEEDBACK_DURATION_MS: f64 = 1_500.0;

/// Round lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    /// Not started (or reset)
    Idle,
    /// Accepting input
    Started,
    Won,
    Lost,
}

/// Short message for the UI, cleared by [`GameRound::tick`]
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub message: String,
    pub expires_at: f64,
}

/// Net result of a finished round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub game: String,
    pub score: u64,
    pub best_combo: u32,
    pub hints_used: u32,
    pub lives_lost: u32,
    pub won: bool,
    pub started_at: f64,
    pub finished_at: f64,
}

/// Starting resources for a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundRules {
    pub lives: u32,
    pub hints: u32,
}

impl Default for RoundRules {
    fn default() -> Self {
        Self { lives: 3, hints: 3 }
    }
}

type SummaryCallback = Box<dyn FnMut(&RoundSummary)>;
type ScoreCallback = Box<dyn FnMut(u64)>;

/// Reusable score/lives/hints/combo state machine
pub struct GameRound {
    game: String,
    rules: RoundRules,
    pub phase: RoundPhase,
    pub score: u64,
    pub lives: u32,
    pub hints: u32,
    pub combo: u32,
    pub best_combo: u32,
    pub hints_used: u32,
    pub lives_lost: u32,
    pub started_at: f64,
    pub feedback: Option<Feedback>,
    on_game_won: Option<SummaryCallback>,
    on_game_lost: Option<SummaryCallback>,
    on_score_change: Option<ScoreCallback>,
}

impl GameRound {
    pub fn new(game: impl Into<String>, rules: RoundRules) -> Self {
        Self {
            game: game.into(),
            rules,
            phase: RoundPhase::Idle,
            score: 0,
            lives: rules.lives,
            hints: rules.hints,
            combo: 0,
            best_combo: 0,
            hints_used: 0,
            lives_lost: 0,
            started_at: 0.0,
            feedback: None,
            on_game_won: None,
            on_game_lost: None,
            on_score_change: None,
        }
    }

    pub fn game(&self) -> &str {
        &self.game
    }

    pub fn on_game_won(&mut self, callback: impl FnMut(&RoundSummary) + 'static) {
        self.on_game_won = Some(Box::new(callback));
    }

    pub fn on_game_lost(&mut self, callback: impl FnMut(&RoundSummary) + 'static) {
        self.on_game_lost = Some(Box::new(callback));
    }

    pub fn on_score_change(&mut self, callback: impl FnMut(u64) + 'static) {
        self.on_score_change = Some(Box::new(callback));
    }

    /// Drop every callback (component teardown)
    pub fn clear_callbacks(&mut self) {
        self.on_game_won = None;
        self.on_game_lost = None;
        self.on_score_change = None;
    }

    fn reset_counters(&mut self) {
        self.score = 0;
        self.lives = self.rules.lives;
        self.hints = self.rules.hints;
        self.combo = 0;
        self.best_combo = 0;
        self.hints_used = 0;
        self.lives_lost = 0;
        self.feedback = None;
    }

    /// Idle/finished -> Started with fresh counters
    pub fn start_game(&mut self, now: f64) {
        self.reset_counters();
        self.started_at = now;
        self.phase = RoundPhase::Started;
    }

    /// Back to Idle from any phase
    pub fn reset_game(&mut self) {
        self.reset_counters();
        self.started_at = 0.0;
        self.phase = RoundPhase::Idle;
    }

    pub fn is_active(&self) -> bool {
        self.phase == RoundPhase::Started
    }

    fn set_score(&mut self, score: u64) {
        if score != self.score {
            self.score = score;
            if let Some(callback) = self.on_score_change.as_mut() {
                callback(score);
            }
        }
    }

    /// Points for a correct answer
    pub fn add_score(&mut self, points: u64) {
        if self.is_active() {
            self.set_score(self.score.saturating_add(points));
        }
    }

    /// Extend the combo and pay its bonus. Returns the bonus awarded.
    pub fn increment_combo(&mut self) -> u64 {
        if !self.is_active() {
            return 0;
        }
        self.combo = self.combo.saturating_add(1);
        self.best_combo = self.best_combo.max(self.combo);
        let bonus = combo_bonus(self.combo);
        if bonus > 0 {
            self.set_score(self.score.saturating_add(bonus));
        }
        bonus
    }

    pub fn break_combo(&mut self) {
        self.combo = 0;
    }

    /// Lose a life (breaks the combo). Reaching zero ends the round.
    pub fn lose_life(&mut self, now: f64) {
        if !self.is_active() {
            return;
        }
        self.break_combo();
        self.lives = self.lives.saturating_sub(1);
        self.lives_lost += 1;
        if self.lives == 0 {
            self.phase = RoundPhase::Lost;
            let summary = self.summary(now);
            if let Some(callback) = self.on_game_lost.as_mut() {
                callback(&summary);
            }
        }
    }

    pub fn set_game_won(&mut self, now: f64) {
        if !self.is_active() {
            return;
        }
        self.phase = RoundPhase::Won;
        let summary = self.summary(now);
        if let Some(callback) = self.on_game_won.as_mut() {
            callback(&summary);
        }
    }

    /// Spend a hint. Fails with feedback when none are left.
    pub fn use_hint(&mut self, now: f64) -> bool {
        if !self.is_active() {
            return false;
        }
        if self.hints == 0 {
            self.show_feedback("No hints left!", now);
            return false;
        }
        self.hints -= 1;
        self.hints_used += 1;
        true
    }

    pub fn show_feedback(&mut self, message: impl Into<String>, now: f64) {
        self.feedback = Some(Feedback {
            message: message.into(),
            expires_at: now + FEEDBACK_DURATION_MS,
        });
    }

    /// Auto-clear expired feedback
    pub fn tick(&mut self, now: f64) {
        if self.feedback.as_ref().is_some_and(|f| now >= f.expires_at) {
            self.feedback = None;
        }
    }

    /// Snapshot of the round's net result
    pub fn summary(&self, now: f64) -> RoundSummary {
        RoundSummary {
            game: self.game.clone(),
            score: self.score,
            best_combo: self.best_combo,
            hints_used: self.hints_used,
            lives_lost: self.lives_lost,
            won: self.phase == RoundPhase::Won,
            started_at: self.started_at,
            finished_at: now,
        }
    }
}
