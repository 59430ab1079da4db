//! The sent-event tracker.
//!
//! This is the one component in the pipeline with real invariants: a durable
//! mapping of notified-event-id to notification timestamp that must
//!
//! - survive process restarts,
//! - tolerate corrupted or legacy-format state files,
//! - expire entries after a configurable retention window, and
//! - only mark an event "sent" after a delivery channel actually succeeded.
//!
//! Expiry happens exclusively in [`SentTracker::load`]; commits are purely
//! additive. The on-disk file is always replaced atomically in full, so a
//! crash mid-persist leaves either the old or the new state, never a partial
//! write.

mod fsync;
mod state;
mod store;

pub use state::TrackerState;
pub use store::{LoadOutcome, SentTracker};

use std::io;

use thiserror::Error;

/// Errors that can occur while persisting tracker state.
///
/// Note that `load` never returns these: an unreadable or corrupt state file
/// degrades to an empty tracker (see [`LoadOutcome`]). Persist failures, by
/// contrast, must be visible to the caller - silently losing a write means
/// future cycles re-notify already-sent events.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
