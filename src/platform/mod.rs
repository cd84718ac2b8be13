//! Platform abstraction layer
//!
//! Handles browser/native differences for:
//! - Time (wall clock in milliseconds)
//! - Storage (LocalStorage on web, in-memory elsewhere)

pub mod storage;
pub mod time;

pub use storage::{FallbackStorage, MemoryStorage, SharedStorage, Storage, StorageError};
pub use time::{Clock, ManualClock, SharedClock, SystemClock, day_index};

#[cfg(target_arch = "wasm32")]
pub use storage::LocalStorage;
