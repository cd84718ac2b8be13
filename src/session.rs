//! Session credential: which access code this browser is playing as
//!
//! `NoSession → create_session → ActiveSession → (logout | invalid) → NoSession`

use serde::{Deserialize, Serialize};

use crate::persistence::{KEY_PREFIX, ProgressStore};
use crate::platform::{Clock, SharedClock, SharedStorage, Storage};
use crate::progress::AccessCode;

/// Key older builds stored the bare code under
pub const LEGACY_SESSION_KEY: &str = "accessCode";

pub fn session_key() -> String {
    format!("{}:session", KEY_PREFIX)
}

/// Stored credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCredential {
    pub code: AccessCode,
    pub issued_at: f64,
}

pub struct SessionManager {
    storage: SharedStorage,
    clock: SharedClock,
}

impl SessionManager {
    pub fn new(storage: SharedStorage, clock: SharedClock) -> Self {
        Self { storage, clock }
    }

    /// Log in as `raw_code`. Malformed codes fail without side effects.
    pub fn create_session(&self, raw_code: &str, store: &ProgressStore) -> bool {
        let Some(code) = AccessCode::parse(raw_code) else {
            log::debug!("Rejected malformed access code");
            return false;
        };

        // Make sure the record exists (and is trustworthy) before binding to it
        store.migrate_legacy(&code);
        if !store.exists(&code) {
            store.reset(&code);
        } else {
            store.load_or_reset(&code);
        }

        self.write(&SessionCredential {
            code,
            issued_at: self.clock.now_ms(),
        })
    }

    fn write(&self, credential: &SessionCredential) -> bool {
        let json = match serde_json::to_string(credential) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("Failed to serialize session: {}", e);
                return false;
            }
        };
        match self.storage.set_item(&session_key(), &json) {
            Ok(()) => {
                log::info!("Session started for {}", credential.code);
                true
            }
            Err(e) => {
                log::warn!("Failed to store session: {}", e);
                false
            }
        }
    }

    /// Full stored credential, if structurally valid
    pub fn credential(&self) -> Option<SessionCredential> {
        let raw = self.storage.get_item(&session_key()).ok().flatten()?;
        match serde_json::from_str::<SessionCredential>(&raw) {
            Ok(credential) if credential.issued_at.is_finite() => Some(credential),
            _ => {
                log::warn!("Ignoring invalid session credential");
                self.logout();
                None
            }
        }
    }

    /// Active access code, `None` when absent or invalid
    pub fn get_session(&self) -> Option<AccessCode> {
        self.credential().map(|c| c.code)
    }

    pub fn logout(&self) {
        if let Err(e) = self.storage.remove_item(&session_key()) {
            log::warn!("Failed to clear session: {}", e);
        }
    }

    /// Upgrade older session formats. Safe to call on every start.
    ///
    /// Recognized shapes: a bare code string under the session key, or a bare
    /// code under [`LEGACY_SESSION_KEY`]. Returns true if something was upgraded.
    pub fn migrate_old_session(&self) -> bool {
        let key = session_key();
        let current = self.storage.get_item(&key).ok().flatten();

        let legacy_code = match current.as_deref() {
            Some(raw) if serde_json::from_str::<SessionCredential>(raw).is_ok() => None,
            // Older builds wrote the code itself, optionally JSON-quoted
            Some(raw) => AccessCode::parse(raw.trim_matches('"')),
            None => self
                .storage
                .get_item(LEGACY_SESSION_KEY)
                .ok()
                .flatten()
                .and_then(|raw| AccessCode::parse(raw.trim_matches('"'))),
        };

        if let Err(e) = self.storage.remove_item(LEGACY_SESSION_KEY) {
            log::warn!("Failed to clear legacy session: {}", e);
        }

        let Some(code) = legacy_code else {
            return false;
        };
        log::info!("Migrated old session for {}", code);
        self.write(&SessionCredential {
            code,
            issued_at: self.clock.now_ms(),
        })
    }
}
