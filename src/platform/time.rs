//! Wall clock abstraction
//!
//! Timestamps are Unix milliseconds as `f64`, matching `Date.now()`.

use std::cell::Cell;
use std::rc::Rc;

/// Milliseconds in one day
pub const MS_PER_DAY: f64 = 86_400_000.0;

/// Source of the current time
pub trait Clock {
    fn now_ms(&self) -> f64;
}

pub type SharedClock = Rc<dyn Clock>;

/// Real wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[cfg(target_arch = "wasm32")]
    fn now_ms(&self) -> f64 {
        js_sys::Date::now()
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn now_ms(&self) -> f64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }
}

/// Hand-driven clock for tests and replays
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    pub fn set(&self, ms: f64) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

/// Whole days since the Unix epoch (UTC), `None` for unusable timestamps
pub fn day_index(ms: f64) -> Option<u32> {
    if !ms.is_finite() || ms < 0.0 {
        return None;
    }
    Some((ms / MS_PER_DAY).floor() as u32)
}
