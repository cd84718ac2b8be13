//! Progress Guard entry point
//!
//! On the web this only installs logging; the page drives `WebProgress`.
//! Natively it replays a short learner session against in-memory storage.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() {
    console_error_panic_hook::set_once();
    if console_log::init_with_level(log::Level::Info).is_err() {
        web_sys::console::warn_1(&"Logger already initialized".into());
    }
    log::info!("Progress Guard loaded");
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("Progress Guard (native) starting...");
    log::info!("Native mode has no browser storage - running an in-memory walkthrough");

    walkthrough();
}

#[cfg(not(target_arch = "wasm32"))]
fn walkthrough() {
    use std::rc::Rc;

    use progress_guard::platform::{FallbackStorage, SystemClock};
    use progress_guard::{ProgressApp, Settings};

    let storage = Rc::new(FallbackStorage::memory_only());
    let mut app = ProgressApp::init(storage, Rc::new(SystemClock), Settings::default());
    app.set_notification_callback(|a| println!("  🏅 {} {} - {}", a.icon, a.title, a.description));

    let code = ProgressApp::generate_code(std::process::id() as u64);
    println!("Logging in as {}", code);
    if !app.login(code.as_str()) {
        println!("Login failed");
        return;
    }

    for delta in [15.0, 40.0, 60.0, 25.0] {
        let outcome = app.award_xp("practice", delta);
        println!(
            "award {:>4} xp -> accepted: {}, gained: {}",
            delta, outcome.accepted, outcome.xp_awarded
        );
    }

    if let Some(snapshot) = app.snapshot() {
        println!(
            "{}: level {} ({} xp, {} into level), streak {}",
            snapshot.code, snapshot.level, snapshot.total_xp, snapshot.xp_into_level, snapshot.streak
        );
    }

    let report = app.storage_report();
    println!(
        "storage: {} bytes, suspicious: {}, memory only: {}",
        report.used_bytes, report.suspicious, report.memory_only
    );
    app.teardown();
}
