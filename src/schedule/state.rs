use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

use crate::utils::lock::LockFile;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to access next-run state: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse next-run state: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Next-run state is locked ({}); remove the lock file if no other process is running", .0.display())]
    Locked(PathBuf),

    #[error("Next-run state has not been initialized")]
    Uninitialized,

    #[error("Next-run state is already initialized (next run at {0})")]
    AlreadyInitialized(DateTime<Utc>),

    #[error("Next run time out of range after adding {0}")]
    OutOfRange(chrono::Duration),
}

/// The single persisted "next run" timestamp
///
/// All methods are atomic with respect to each other. Implementations are
/// synchronous; the scheduler calls them from the blocking pool.
pub trait NextRunStore: Send + Sync {
    /// Current next-run time
    ///
    /// # Errors
    ///
    /// Returns `Uninitialized` if no timestamp was ever stored, or an I/O / parse error.
    fn get(&self) -> Result<DateTime<Utc>, PersistenceError>;

    /// Move the timestamp from `expected` to `expected + by` and return the new value.
    ///
    /// Returns `Ok(None)` without writing when the stored value is no longer
    /// `expected`: another instance has taken that run, or the state was edited
    /// while the caller was waiting. On error the stored value is unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the read-modify-write could not complete.
    fn advance_if(
        &self,
        expected: DateTime<Utc>,
        by: chrono::Duration,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError>;

    /// Store the first timestamp
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInitialized` if a timestamp exists.
    fn initialize(&self, at: DateTime<Utc>) -> Result<(), PersistenceError>;
}

fn shifted(current: DateTime<Utc>, by: chrono::Duration) -> Result<DateTime<Utc>, PersistenceError> {
    current
        .checked_add_signed(by)
        .ok_or(PersistenceError::OutOfRange(by))
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryNextRunStore {
    next_run: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryNextRunStore {
    #[must_use]
    pub fn new(next_run: DateTime<Utc>) -> Self {
        Self {
            next_run: Mutex::new(Some(next_run)),
        }
    }

    #[must_use]
    pub fn uninitialized() -> Self {
        Self::default()
    }
}

impl NextRunStore for MemoryNextRunStore {
    fn get(&self) -> Result<DateTime<Utc>, PersistenceError> {
        self.next_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ok_or(PersistenceError::Uninitialized)
    }

    fn advance_if(
        &self,
        expected: DateTime<Utc>,
        by: chrono::Duration,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        let mut next_run = self.next_run.lock().unwrap_or_else(PoisonError::into_inner);
        let current = next_run.ok_or(PersistenceError::Uninitialized)?;
        if current != expected {
            return Ok(None);
        }
        let advanced = shifted(current, by)?;
        *next_run = Some(advanced);
        Ok(Some(advanced))
    }

    fn initialize(&self, at: DateTime<Utc>) -> Result<(), PersistenceError> {
        let mut next_run = self.next_run.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = *next_run {
            return Err(PersistenceError::AlreadyInitialized(existing));
        }
        *next_run = Some(at);
        Ok(())
    }
}

/// On-disk representation of the state file
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct StateFile {
    next_run: DateTime<Utc>,
}

/// State kept in a small JSON file
///
/// Writers are serialized through an exclusive `<file>.lock` created next to the
/// state file, and every write replaces the file atomically, so a crash leaves
/// either the old or the new timestamp on disk.
#[derive(Debug, Clone)]
pub struct FileNextRunStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileNextRunStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = LockFile::path_for(&path);
        Self { path, lock_path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<LockFile, PersistenceError> {
        LockFile::acquire(&self.lock_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                PersistenceError::Locked(self.lock_path.clone())
            } else {
                PersistenceError::Io(e)
            }
        })
    }

    fn read(&self) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let state: StateFile = serde_json::from_str(&content)?;
                Ok(Some(state.next_run))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::Io(e)),
        }
    }

    fn write(&self, next_run: DateTime<Utc>) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(&StateFile { next_run })?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| PersistenceError::Io(e.error))?;
        Ok(())
    }
}

impl NextRunStore for FileNextRunStore {
    fn get(&self) -> Result<DateTime<Utc>, PersistenceError> {
        self.read()?.ok_or(PersistenceError::Uninitialized)
    }

    fn advance_if(
        &self,
        expected: DateTime<Utc>,
        by: chrono::Duration,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        let _guard = self.lock()?;
        let current = self.read()?.ok_or(PersistenceError::Uninitialized)?;
        if current != expected {
            debug!(%expected, %current, "Next-run state moved, not advancing");
            return Ok(None);
        }
        let next_run = shifted(current, by)?;
        self.write(next_run)?;
        debug!(previous = %current, %next_run, "Advanced next-run state");
        Ok(Some(next_run))
    }

    fn initialize(&self, at: DateTime<Utc>) -> Result<(), PersistenceError> {
        let _guard = self.lock()?;
        if let Some(existing) = self.read()? {
            return Err(PersistenceError::AlreadyInitialized(existing));
        }
        self.write(at)
    }
}
