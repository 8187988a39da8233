use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::info;

use crate::core::types::ParticipantId;
use crate::dispatch::{DispatchError, OutcomeDispatcher};

/// Logs every notification instead of delivering it
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

impl OutcomeDispatcher for LogDispatcher {
    fn notify_match(&self, a: ParticipantId, b: ParticipantId) -> Result<(), DispatchError> {
        info!(%a, %b, "Match found");
        Ok(())
    }

    fn notify_unmatched(
        &self,
        participant: ParticipantId,
        next_run: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        info!(
            %participant,
            next_run = %next_run.format("%Y-%m-%d"),
            "No partner this time, try again next run"
        );
        Ok(())
    }
}

/// One line in the outbox file
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
enum OutboxMessage {
    Match {
        a: ParticipantId,
        b: ParticipantId,
    },
    Unmatched {
        participant: ParticipantId,
        next_run: DateTime<Utc>,
    },
}

/// Appends each notification as a JSON line to a file that a delivery
/// process (the chat bot) picks up
#[derive(Debug)]
pub struct OutboxDispatcher {
    path: PathBuf,
    file: Mutex<File>,
}

impl OutboxDispatcher {
    /// Open (or create) the outbox for appending
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DispatchError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, message: &OutboxMessage) -> Result<(), DispatchError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

impl OutcomeDispatcher for OutboxDispatcher {
    fn notify_match(&self, a: ParticipantId, b: ParticipantId) -> Result<(), DispatchError> {
        self.append(&OutboxMessage::Match { a, b })
    }

    fn notify_unmatched(
        &self,
        participant: ParticipantId,
        next_run: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        self.append(&OutboxMessage::Unmatched {
            participant,
            next_run,
        })
    }
}
