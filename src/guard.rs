//! Anti-abuse heuristics
//!
//! Every check answers with a boolean and never panics. What to do with a
//! `false` is the caller's policy: rate limits disallow, timing checks flag.

use std::collections::{HashMap, VecDeque};

use crate::platform::{Clock, SharedClock};

/// Sliding-window rate limiter keyed by action
pub struct RateLimiter {
    clock: SharedClock,
    max_attempts: usize,
    window_ms: f64,
    windows: HashMap<String, VecDeque<f64>>,
}

impl RateLimiter {
    pub fn new(clock: SharedClock, max_attempts: usize, window_ms: f64) -> Self {
        Self {
            clock,
            max_attempts,
            window_ms,
            windows: HashMap::new(),
        }
    }

    /// Record an attempt for `action_key` if fewer than `max_attempts` fall
    /// inside the trailing window. Rejected attempts are not recorded.
    pub fn allow(&mut self, action_key: &str) -> bool {
        let now = self.clock.now_ms();
        // Unknown time means unknown rate: disallow
        if !now.is_finite() || !self.window_ms.is_finite() || self.max_attempts == 0 {
            return false;
        }

        let window = self.windows.entry(action_key.to_string()).or_default();
        let cutoff = now - self.window_ms;
        while window.front().is_some_and(|&t| t <= cutoff) {
            window.pop_front();
        }
        // Clock went backwards: forget the future
        window.retain(|&t| t <= now);

        if window.len() >= self.max_attempts {
            log::debug!("Rate limit hit for {}", action_key);
            return false;
        }
        window.push_back(now);
        true
    }

    /// Attempts currently counted for `action_key`
    pub fn attempts(&self, action_key: &str) -> usize {
        self.windows.get(action_key).map_or(0, VecDeque::len)
    }

    pub fn reset_key(&mut self, action_key: &str) {
        self.windows.remove(action_key);
    }

    pub fn clear(&mut self) {
        self.windows.clear();
    }
}

/// True when the activity took at least `minimum_ms`
pub fn is_plausible_duration(started_at: f64, finished_at: f64, minimum_ms: f64) -> bool {
    if !(started_at.is_finite() && finished_at.is_finite() && minimum_ms.is_finite()) {
        return false;
    }
    finished_at >= started_at && finished_at - started_at >= minimum_ms
}

/// Diagnostic only: storage usage above `threshold_bytes`
pub fn is_storage_suspicious(total_bytes: usize, threshold_bytes: usize) -> bool {
    total_bytes > threshold_bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ManualClock;
    use std::rc::Rc;

    fn limiter(clock: &Rc<ManualClock>) -> RateLimiter {
        RateLimiter::new(clock.clone(), 3, 5_000.0)
    }

    #[test]
    fn test_allow_three_per_window() {
        let clock = Rc::new(ManualClock::new(10_000.0));
        let mut guard = limiter(&clock);
        let mut results = Vec::new();
        for _ in 0..4 {
            results.push(guard.allow("submit"));
            clock.advance(250.0);
        }
        assert_eq!(results, vec![true, true, true, false]);
    }

    #[test]
    fn test_rejected_attempts_do_not_extend_window() {
        let clock = Rc::new(ManualClock::new(0.0));
        let mut guard = limiter(&clock);
        for _ in 0..3 {
            assert!(guard.allow("submit"));
        }
        clock.set(4_000.0);
        assert!(!guard.allow("submit"));
        assert_eq!(guard.attempts("submit"), 3);
        // Window measured from the accepted attempts at t=0
        clock.set(5_000.0);
        assert!(guard.allow("submit"));
    }

    #[test]
    fn test_keys_are_independent() {
        let clock = Rc::new(ManualClock::new(0.0));
        let mut guard = limiter(&clock);
        for _ in 0..3 {
            guard.allow("a");
        }
        assert!(!guard.allow("a"));
        assert!(guard.allow("b"));
        guard.reset_key("a");
        assert!(guard.allow("a"));
    }

    #[test]
    fn test_non_finite_clock_disallows() {
        let clock = Rc::new(ManualClock::new(f64::NAN));
        let mut guard = limiter(&clock);
        assert!(!guard.allow("submit"));
        assert_eq!(guard.attempts("submit"), 0);
    }

    #[test]
    fn test_plausible_duration() {
        let t = 1_700_000_000_000.0;
        assert!(!is_plausible_duration(t, t + 5.0, 1_000.0));
        assert!(is_plausible_duration(t, t + 2_000.0, 1_000.0));
        assert!(is_plausible_duration(t, t + 1_000.0, 1_000.0));
        assert!(!is_plausible_duration(t, t - 5_000.0, 1_000.0));
        assert!(!is_plausible_duration(f64::NAN, t, 1_000.0));
        assert!(!is_plausible_duration(t, f64::INFINITY, 1_000.0));
    }

    #[test]
    fn test_storage_suspicious() {
        assert!(!is_storage_suspicious(1_000, 4_000_000));
        assert!(is_storage_suspicious(4_000_001, 4_000_000));
    }
}
