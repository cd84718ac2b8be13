//! Save/load persistence with integrity verification
//!
//! Features:
//! - Versioned JSON envelope
//! - BLAKE3 integrity tag (detects accidental or naive edits, not a security boundary)
//! - Legacy layout migration
//! - Corruption detection and recovery (discard and reinitialize)

pub mod envelope;
pub mod migration;
pub mod store;

pub use envelope::{IntegrityEnvelope, IntegrityError, compute_tag, verify, verify_str};
pub use store::ProgressStore;

/// Prefix for every key this crate owns
pub const KEY_PREFIX: &str = "progress_guard";
