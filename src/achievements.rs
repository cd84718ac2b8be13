//! Achievement catalog and evaluation
//!
//! The catalog is static and read-only. Evaluation diffs every predicate
//! against the learner's unlocked set, so running it twice with no state
//! change never notifies twice. It is driven both eagerly (after XP awards
//! and round completion) and by a coarse poll as a safety net.

use serde::Serialize;

use crate::persistence::ProgressStore;
use crate::progress::{AccessCode, ProgressRecord};

/// One catalog entry
#[derive(Clone, Copy)]
pub struct Achievement {
    pub id: &'static str,
    pub title: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
    /// Unlock condition (pure)
    pub predicate: fn(&ProgressRecord) -> bool,
}

impl Achievement {
    pub fn info(&self) -> AchievementInfo {
        AchievementInfo {
            id: self.id,
            title: self.title,
            icon: self.icon,
            description: self.description,
        }
    }
}

impl std::fmt::Debug for Achievement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Achievement").field("id", &self.id).finish()
    }
}

/// What the UI sees of an achievement (never the predicate)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AchievementInfo {
    pub id: &'static str,
    pub title: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
}

/// Built-in catalog, evaluated in this order
pub static STANDARD_ACHIEVEMENTS: &[Achievement] = &[
    Achievement {
        id: "first_steps",
        title: "First Steps",
        icon: "👣",
        description: "Earn your first 10 XP",
        predicate: |r| r.total_xp >= 10,
    },
    Achievement {
        id: "xp_100",
        title: "Centurion",
        icon: "💯",
        description: "Reach 100 XP",
        predicate: |r| r.total_xp >= 100,
    },
    Achievement {
        id: "xp_500",
        title: "Dedicated",
        icon: "📚",
        description: "Reach 500 XP",
        predicate: |r| r.total_xp >= 500,
    },
    Achievement {
        id: "xp_1000",
        title: "Thousand Club",
        icon: "🏆",
        description: "Reach 1000 XP",
        predicate: |r| r.total_xp >= 1_000,
    },
    Achievement {
        id: "level_5",
        title: "Rising Star",
        icon: "⭐",
        description: "Reach level 5",
        predicate: |r| r.level >= 5,
    },
    Achievement {
        id: "level_10",
        title: "Grandmaster",
        icon: "👑",
        description: "Reach level 10",
        predicate: |r| r.level >= 10,
    },
    Achievement {
        id: "streak_3",
        title: "On a Roll",
        icon: "🔥",
        description: "Learn three days in a row",
        predicate: |r| r.streak >= 3,
    },
    Achievement {
        id: "streak_7",
        title: "Week Warrior",
        icon: "📅",
        description: "Learn seven days in a row",
        predicate: |r| r.streak >= 7,
    },
    Achievement {
        id: "first_win",
        title: "Winner",
        icon: "🎮",
        description: "Win your first game",
        predicate: |r| r.stats.rounds_won >= 1,
    },
    Achievement {
        id: "ten_wins",
        title: "Champion",
        icon: "🥇",
        description: "Win ten games",
        predicate: |r| r.stats.rounds_won >= 10,
    },
    Achievement {
        id: "perfect_round",
        title: "Flawless",
        icon: "💎",
        description: "Win a game without losing a life",
        predicate: |r| r.stats.perfect_rounds >= 1,
    },
    Achievement {
        id: "combo_5",
        title: "Combo Starter",
        icon: "⚡",
        description: "Reach a 5x combo",
        predicate: |r| r.stats.best_combo >= 5,
    },
    Achievement {
        id: "combo_10",
        title: "Combo Master",
        icon: "🌩️",
        description: "Reach a 10x combo",
        predicate: |r| r.stats.best_combo >= 10,
    },
    Achievement {
        id: "scholar",
        title: "Scholar",
        icon: "🎓",
        description: "Complete five lessons",
        predicate: |r| r.stats.lessons_completed >= 5,
    },
];

/// Handle to a static achievement table
#[derive(Debug, Clone, Copy)]
pub struct Catalog {
    entries: &'static [Achievement],
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl Catalog {
    pub fn standard() -> Self {
        Self::new(STANDARD_ACHIEVEMENTS)
    }

    pub fn new(entries: &'static [Achievement]) -> Self {
        Self { entries }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&'static Achievement> {
        self.entries.iter().find(|a| a.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'static, Achievement> {
        self.entries.iter()
    }

    /// Catalog as the UI sees it
    pub fn infos(&self) -> Vec<AchievementInfo> {
        self.iter().map(Achievement::info).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Notification sink for newly unlocked achievements
pub type NotificationCallback = Box<dyn FnMut(&AchievementInfo)>;

/// Evaluates the catalog and notifies once per unlock
pub struct AchievementEngine {
    catalog: Catalog,
    callback: Option<NotificationCallback>,
}

impl AchievementEngine {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            callback: None,
        }
    }

    pub fn catalog(&self) -> Catalog {
        self.catalog
    }

    /// Replace the notification sink (last writer wins)
    pub fn set_notification_callback(&mut self, callback: impl FnMut(&AchievementInfo) + 'static) {
        self.callback = Some(Box::new(callback));
    }

    pub fn clear_notification_callback(&mut self) {
        self.callback = None;
    }

    /// Evaluate every locked achievement in catalog order.
    ///
    /// Each newly satisfied id is persisted first, then notified; returns the
    /// unlocks in the order they were notified.
    pub fn check_all(&mut self, store: &ProgressStore, code: &AccessCode) -> Vec<AchievementInfo> {
        let record = store.load_or_reset(code);
        let catalog = self.catalog;
        let mut unlocked = Vec::new();

        for achievement in catalog.iter() {
            if record.has_achievement(achievement.id) || !(achievement.predicate)(&record) {
                continue;
            }
            // False means someone else already unlocked it
            if !store.unlock_achievement(code, achievement.id) {
                continue;
            }
            let info = achievement.info();
            log::info!("Achievement unlocked for {}: {}", code, info.id);
            if let Some(callback) = self.callback.as_mut() {
                callback(&info);
            }
            unlocked.push(info);
        }

        unlocked
    }
}

/// Coarse periodic trigger for [`AchievementEngine::check_all`]
#[derive(Debug, Clone)]
pub struct PollTimer {
    interval_ms: f64,
    next_due: Option<f64>,
}

impl PollTimer {
    pub fn new(interval_ms: f64) -> Self {
        Self {
            interval_ms: interval_ms.max(1.0),
            next_due: None,
        }
    }

    /// Start (or restart) counting from `now`
    pub fn arm(&mut self, now: f64) {
        self.next_due = Some(now + self.interval_ms);
    }

    /// Cancel; `fire_if_due` returns false until re-armed
    pub fn disarm(&mut self) {
        self.next_due = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    /// True when the period elapsed; re-arms from `now`
    pub fn fire_if_due(&mut self, now: f64) -> bool {
        match self.next_due {
            Some(due) if now.is_finite() && now >= due => {
                self.arm(now);
                true
            }
            _ => false,
        }
    }
}
