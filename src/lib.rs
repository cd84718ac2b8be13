//! Progress Guard - tamper-evident learner progress for the browser
//!
//! Core modules:
//! - `persistence`: Checksummed progress store and legacy migration
//! - `session`: Access-code session credential
//! - `achievements`: Static catalog and at-most-once unlock notifications
//! - `guard`: Rate limiting and timing plausibility checks
//! - `sim`: Minigame round state machine and scoring
//! - `platform`: Browser/native storage and clock abstraction
//! - `app`: Composition root wiring everything together

pub mod achievements;
pub mod app;
pub mod guard;
pub mod highscores;
pub mod persistence;
pub mod platform;
pub mod progress;
pub mod session;
pub mod settings;
pub mod sim;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use achievements::{AchievementEngine, AchievementInfo, Catalog};
pub use app::{Outcome, ProgressApp, Snapshot};
pub use highscores::HighScores;
pub use persistence::ProgressStore;
pub use progress::{AccessCode, ProgressRecord, level_for};
pub use session::SessionManager;
pub use settings::Settings;

/// Fixed data-model constants
pub mod consts {
    /// Characters in an access code
    pub const ACCESS_CODE_LEN: usize = 4;

    /// Minimum XP for each level; level N starts at `LEVEL_THRESHOLDS[N - 1]`
    pub const LEVEL_THRESHOLDS: [u64; 10] = [0, 100, 250, 500, 1_000, 2_000, 3_500, 5_500, 8_000, 11_000];

    /// Highest reachable level
    pub const MAX_LEVEL: u32 = LEVEL_THRESHOLDS.len() as u32;
}
