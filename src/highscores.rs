//! Personal bests per minigame
//!
//! Persisted per learner and game, tracks the top 10 winning rounds.

use serde::{Deserialize, Serialize};

use crate::persistence::KEY_PREFIX;
use crate::platform::Storage;
use crate::progress::AccessCode;

/// Maximum number of entries to keep
pub const MAX_HIGH_SCORES: usize = 10;

/// A single high score entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighScoreEntry {
    pub score: u64,
    pub best_combo: u32,
    /// Unix timestamp (ms) when achieved
    pub timestamp: f64,
}

/// Leaderboard for one learner and one game
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HighScores {
    pub entries: Vec<HighScoreEntry>,
}

impl HighScores {
    pub fn storage_key(code: &AccessCode, game: &str) -> String {
        format!("{}:bests:{}:{}", KEY_PREFIX, code, game)
    }

    /// Create empty leaderboard
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Check if a score qualifies for the leaderboard
    pub fn qualifies(&self, score: u64) -> bool {
        if score == 0 {
            return false;
        }
        if self.entries.len() < MAX_HIGH_SCORES {
            return true;
        }
        self.entries.last().map(|e| score > e.score).unwrap_or(true)
    }

    /// Add a new score (if it qualifies). Returns the rank achieved.
    pub fn add_score(&mut self, score: u64, best_combo: u32, timestamp: f64) -> Option<usize> {
        if !self.qualifies(score) {
            return None;
        }

        let entry = HighScoreEntry {
            score,
            best_combo,
            timestamp,
        };

        // Sorted descending by score
        let pos = self.entries.iter().position(|e| score > e.score);
        let rank = match pos {
            Some(i) => {
                self.entries.insert(i, entry);
                i + 1
            }
            None => {
                self.entries.push(entry);
                self.entries.len()
            }
        };

        self.entries.truncate(MAX_HIGH_SCORES);

        Some(rank)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn top_score(&self) -> Option<u64> {
        self.entries.first().map(|e| e.score)
    }

    /// Load from storage; unreadable data starts fresh
    pub fn load(storage: &dyn Storage, code: &AccessCode, game: &str) -> Self {
        if let Ok(Some(json)) = storage.get_item(&Self::storage_key(code, game)) {
            if let Ok(mut scores) = serde_json::from_str::<HighScores>(&json) {
                // Hand-edited lists may be unsorted or oversized
                scores.entries.sort_by(|a, b| b.score.cmp(&a.score));
                scores.entries.truncate(MAX_HIGH_SCORES);
                log::debug!("Loaded {} high scores for {}", scores.entries.len(), game);
                return scores;
            }
        }
        Self::new()
    }

    pub fn save(&self, storage: &dyn Storage, code: &AccessCode, game: &str) {
        if let Ok(json) = serde_json::to_string(self) {
            match storage.set_item(&Self::storage_key(code, game), &json) {
                Ok(()) => log::debug!("High scores saved ({} entries)", self.entries.len()),
                Err(e) => log::warn!("High scores not saved: {}", e),
            }
        }
    }
}
