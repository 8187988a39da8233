//! The waiting pool: where participants come from before each run.
//!
//! - [`ParticipantSource`]: narrow trait the scheduler reads the pool through
//! - [`JsonPool`]: pool kept in a JSON file (participants plus meeting history)
//! - [`MemoryPool`]: in-process pool for tests and embedding
//! - [`snapshot`]: turns raw pool records into a validated per-run snapshot
//!
//! ## Pool file format
//!
//! ```json
//! {
//!   "participants": [
//!     {
//!       "id": 101,
//!       "role": "student",
//!       "interests": ["music", "books"],
//!       "meeting_format": "offline",
//!       "preferred_places": ["campus", "cafe"],
//!       "groups": ["M3100"],
//!       "workplaces": [],
//!       "joined_at": "2024-05-01T09:00:00Z"
//!     }
//!   ],
//!   "meetings": [{ "a": 101, "b": 102, "took_place": true }]
//! }
//! ```
//!
//! Meetings that took place exclude the two participants from being paired again.
//! A record that cannot be read or validated is skipped with a warning; it never aborts a run.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::participant::Participant;
use crate::core::types::ParticipantId;
use crate::matching::outcome::MatchOutcome;

pub mod snapshot;
pub mod store;

pub use snapshot::{build_snapshot, MeetingRecord, ParticipantRecord, PoolData, RawPool, Snapshot};
pub use store::{JsonPool, MemoryPool};

/// The whole source could not be read
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read pool: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse pool: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Pool is locked ({}); remove the lock file if no other writer is running", .0.display())]
    Locked(std::path::PathBuf),
}

/// One pool record is incomplete or unreadable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("Participant {id}: missing field '{field}'")]
    MissingField {
        id: ParticipantId,
        field: &'static str,
    },

    #[error("Participant {id}: unknown {kind} '{value}'")]
    UnknownTag {
        id: ParticipantId,
        kind: &'static str,
        value: String,
    },

    #[error("Participant {id}: invalid {kind} name '{value}'")]
    InvalidLabel {
        id: ParticipantId,
        kind: &'static str,
        value: String,
    },

    #[error("Pool {kind} #{index} is malformed: {reason}")]
    Malformed {
        kind: &'static str,
        index: usize,
        reason: String,
    },

    #[error("Participant {id} is listed more than once")]
    Duplicate { id: ParticipantId },

    #[error("Pool rejected: {0}")]
    TooLarge(String),
}

/// Read access to the waiting pool
///
/// Implementations are synchronous; the scheduler calls them from the blocking pool.
pub trait ParticipantSource: Send + Sync {
    /// Participants who joined strictly before `before`, each a validated snapshot.
    /// Invalid records are omitted (and logged), not reported as errors.
    ///
    /// # Errors
    ///
    /// Returns an error only if the pool as a whole cannot be read.
    fn list_waiting(&self, before: DateTime<Utc>) -> Result<Vec<Participant>, SourceError>;

    /// Take matched participants out of the queue and remember their meetings.
    /// Participants left free stay in the queue for the next run.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be updated.
    fn record_outcome(&self, _outcome: &MatchOutcome) -> Result<(), SourceError> {
        Ok(())
    }
}
