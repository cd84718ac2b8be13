//! Minigame round simulation
//!
//! Pure, storage-free state shared by every minigame:
//! - Round lifecycle (Idle → Started → Won/Lost)
//! - Lives, hints and combo bookkeeping
//! - Deterministic scoring rules

pub mod round;
pub mod scoring;

pub use round::{Feedback, GameRound, RoundPhase, RoundRules, RoundSummary, FEEDBACK_DURATION_MS};
pub use scoring::{combo_bonus, round_xp};
