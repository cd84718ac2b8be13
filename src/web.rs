//! JavaScript bindings (WASM only)
//!
//! Structured values cross the boundary as JSON strings so the page needs
//! no generated typings.

use std::rc::Rc;

use wasm_bindgen::prelude::*;

use crate::app::ProgressApp;
use crate::platform::{FallbackStorage, LocalStorage, SharedStorage, Storage, SystemClock};
use crate::settings::Settings;
use crate::sim::RoundSummary;

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        log::warn!("Failed to serialize for JS: {}", e);
        "null".to_string()
    })
}

/// Page-wide progress handle
#[wasm_bindgen]
pub struct WebProgress {
    app: ProgressApp,
}

#[wasm_bindgen]
impl WebProgress {
    #[wasm_bindgen(constructor)]
    pub fn new() -> WebProgress {
        let primary = LocalStorage::open().map(|s| Box::new(s) as Box<dyn Storage>);
        let storage: SharedStorage = Rc::new(FallbackStorage::new(primary));
        let settings = Settings::load(storage.as_ref());
        let app = ProgressApp::init(storage, Rc::new(SystemClock), settings);
        WebProgress { app }
    }

    /// Random access code for onboarding
    #[wasm_bindgen(js_name = generateCode)]
    pub fn generate_code() -> String {
        ProgressApp::generate_code(js_sys::Date::now() as u64).to_string()
    }

    pub fn login(&mut self, code: &str) -> bool {
        self.app.login(code)
    }

    pub fn logout(&mut self) {
        self.app.logout();
    }

    /// Active access code, if any
    pub fn session(&self) -> Option<String> {
        self.app.active_code().map(|c| c.to_string())
    }

    #[wasm_bindgen(js_name = awardXp)]
    pub fn award_xp(&mut self, action: &str, delta: f64) -> String {
        to_json(&self.app.award_xp(action, delta))
    }

    #[wasm_bindgen(js_name = completeLesson)]
    pub fn complete_lesson(&mut self, lesson_id: &str, started_at: f64, xp: f64) -> String {
        let xp = if xp.is_finite() && xp >= 0.0 { xp as u64 } else { 0 };
        to_json(&self.app.complete_lesson(lesson_id, started_at, xp))
    }

    /// Flush a round summary (JSON) produced by a minigame
    #[wasm_bindgen(js_name = finishRound)]
    pub fn finish_round(&mut self, summary_json: &str) -> String {
        match serde_json::from_str::<RoundSummary>(summary_json) {
            Ok(summary) => to_json(&self.app.finish_round(&summary)),
            Err(e) => {
                log::warn!("Rejected round summary: {}", e);
                to_json(&crate::app::Outcome::default())
            }
        }
    }

    /// Current progress as JSON (`null` without a session)
    pub fn snapshot(&self) -> String {
        to_json(&self.app.snapshot())
    }

    /// Achievement catalog as JSON
    pub fn catalog(&self) -> String {
        to_json(&self.app.catalog())
    }

    /// Register the single notification sink; receives achievement JSON
    #[wasm_bindgen(js_name = onAchievement)]
    pub fn on_achievement(&mut self, callback: js_sys::Function) {
        self.app.set_notification_callback(move |achievement| {
            let payload = JsValue::from_str(&to_json(achievement));
            if let Err(e) = callback.call1(&JsValue::NULL, &payload) {
                log::warn!("Achievement callback threw: {:?}", e);
            }
        });
    }

    /// Drive the polling timer; call from `setInterval`
    pub fn tick(&mut self) -> u32 {
        self.app.tick().len() as u32
    }

    #[wasm_bindgen(js_name = storageReport)]
    pub fn storage_report(&self) -> String {
        to_json(&self.app.storage_report())
    }

    pub fn teardown(&mut self) {
        self.app.teardown();
    }
}

impl Default for WebProgress {
    fn default() -> Self {
        Self::new()
    }
}
