use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use serde_json::Value;
use tracing::info;

use crate::core::participant::Participant;
use crate::core::types::ParticipantId;
use crate::matching::outcome::MatchOutcome;
use crate::pool::snapshot::{build_snapshot, MeetingRecord, PoolData, RawPool};
use crate::pool::{ParticipantSource, SourceError};
use crate::utils::lock::LockFile;

/// Pool stored in a JSON file
///
/// The file is read on every call, so edits made between runs (new sign-ups,
/// feedback marking meetings as held) are picked up without a restart. Updates
/// hold `<file>.lock` for the whole read-modify-write; other writers of the pool
/// file take the same lock.
#[derive(Debug, Clone)]
pub struct JsonPool {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonPool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = LockFile::path_for(&path);
        Self { path, lock_path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file, keeping every entry as raw JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a JSON pool document.
    pub fn load_raw(&self) -> Result<RawPool, SourceError> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Read the file and type every entry; entries that do not fit are kept in
    /// `PoolData::malformed`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a JSON pool document.
    pub fn load(&self) -> Result<PoolData, SourceError> {
        Ok(PoolData::from(&self.load_raw()?))
    }

    /// Replace the file atomically with `data`
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be serialized or written.
    pub fn save(&self, data: &RawPool) -> Result<(), SourceError> {
        let json = serde_json::to_string_pretty(data)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| SourceError::Io(e.error))?;
        Ok(())
    }

    fn lock(&self) -> Result<LockFile, SourceError> {
        LockFile::acquire(&self.lock_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                SourceError::Locked(self.lock_path.clone())
            } else {
                SourceError::Io(e)
            }
        })
    }
}

impl ParticipantSource for JsonPool {
    fn list_waiting(&self, before: DateTime<Utc>) -> Result<Vec<Participant>, SourceError> {
        let data = self.load()?;
        Ok(build_snapshot(&data, before).participants)
    }

    fn record_outcome(&self, outcome: &MatchOutcome) -> Result<(), SourceError> {
        if outcome.pairs.is_empty() {
            return Ok(());
        }

        let _guard = self.lock()?;
        let mut raw = self.load_raw()?;
        let matched = outcome.matched_ids();
        let before = raw.participants.len();
        // Entries without a readable id are never matched and stay as they are
        raw.participants.retain(|entry| {
            entry
                .get("id")
                .and_then(Value::as_i64)
                .map_or(true, |id| matched.binary_search(&ParticipantId(id)).is_err())
        });
        for pair in &outcome.pairs {
            raw.meetings.push(serde_json::to_value(MeetingRecord {
                a: pair.low.0,
                b: pair.high.0,
                took_place: false,
            })?);
        }
        self.save(&raw)?;

        info!(
            path = %self.path.display(),
            removed = before - raw.participants.len(),
            meetings = outcome.pairs.len(),
            "Recorded run outcome in pool"
        );
        Ok(())
    }
}

/// One queued participant in a [`MemoryPool`]
#[derive(Debug, Clone)]
struct WaitingEntry {
    participant: Participant,
    joined_at: DateTime<Utc>,
}

/// In-process pool
#[derive(Debug, Default)]
pub struct MemoryPool {
    entries: Mutex<Vec<WaitingEntry>>,
}

impl MemoryPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a participant; a participant already queued under the same id is replaced
    pub fn add(&self, participant: Participant, joined_at: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|e| e.participant.id != participant.id);
        entries.push(WaitingEntry {
            participant,
            joined_at,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ParticipantSource for MemoryPool {
    fn list_waiting(&self, before: DateTime<Utc>) -> Result<Vec<Participant>, SourceError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut waiting: Vec<Participant> = entries
            .iter()
            .filter(|e| e.joined_at < before)
            .map(|e| e.participant.clone())
            .collect();
        waiting.sort_by_key(|p| p.id);
        Ok(waiting)
    }

    fn record_outcome(&self, outcome: &MatchOutcome) -> Result<(), SourceError> {
        let matched = outcome.matched_ids();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|e| matched.binary_search(&e.participant.id).is_err());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Role;
    use crate::matching::outcome::Pair;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn outcome_pairing(a: i64, b: i64) -> MatchOutcome {
        let roles: BTreeMap<ParticipantId, Role> = [(ParticipantId(a), Role::Worker), (ParticipantId(b), Role::Worker)]
            .into_iter()
            .collect();
        MatchOutcome::new(
            vec![Pair::new(ParticipantId(a), ParticipantId(b), 1)],
            Vec::new(),
            roles,
        )
    }

    #[test]
    fn test_memory_pool_filters_by_join_time() {
        let pool = MemoryPool::new();
        pool.add(Participant::new(2, Role::Worker), at(8));
        pool.add(Participant::new(1, Role::Worker), at(9));
        pool.add(Participant::new(3, Role::Worker), at(11));

        let waiting = pool.list_waiting(at(10)).unwrap();
        let ids: Vec<i64> = waiting.iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_memory_pool_record_outcome_removes_matched() {
        let pool = MemoryPool::new();
        for id in 1..=3 {
            pool.add(Participant::new(id, Role::Worker), at(8));
        }
        pool.record_outcome(&outcome_pairing(1, 3)).unwrap();
        let waiting = pool.list_waiting(at(12)).unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].id, ParticipantId(2));
    }

    #[test]
    fn test_json_pool_round_trip_and_record_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        std::fs::write(
            &path,
            r#"{"participants": [
                {"id": 1, "role": "worker", "joined_at": "2024-05-01T08:00:00Z"},
                {"id": 2, "role": "worker", "joined_at": "2024-05-01T08:00:00Z"},
                {"id": 3, "role": "worker", "joined_at": "2024-05-01T08:00:00Z"}
            ]}"#,
        )
        .unwrap();

        let pool = JsonPool::new(&path);
        assert_eq!(pool.list_waiting(at(12)).unwrap().len(), 3);

        pool.record_outcome(&outcome_pairing(1, 2)).unwrap();
        let data = pool.load().unwrap();
        assert_eq!(data.participants.len(), 1);
        assert_eq!(data.participants[0].id, 3);
        assert_eq!(
            data.meetings,
            vec![MeetingRecord {
                a: 1,
                b: 2,
                took_place: false
            }]
        );
    }

    #[test]
    fn test_json_pool_missing_file() {
        let pool = JsonPool::new("/nonexistent/pool.json");
        assert!(matches!(
            pool.list_waiting(at(12)),
            Err(SourceError::Io(_))
        ));
    }

    #[test]
    fn test_json_pool_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JsonPool::new(&path).list_waiting(at(12)),
            Err(SourceError::Parse(_))
        ));
    }

    #[test]
    fn test_json_pool_skips_badly_typed_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        std::fs::write(
            &path,
            r#"{"participants": [
                {"id": 1, "role": "worker", "joined_at": "2024-05-01T08:00:00Z"},
                {"id": 2, "role": "worker", "joined_at": "2024-05-01T08:00:00Z"},
                {"id": 3, "role": "worker", "joined_at": "last tuesday"}
            ]}"#,
        )
        .unwrap();

        let pool = JsonPool::new(&path);
        let ids: Vec<i64> = pool
            .list_waiting(at(12))
            .unwrap()
            .iter()
            .map(|p| p.id.0)
            .collect();
        assert_eq!(ids, vec![1, 2]);

        // Recording the run keeps the unreadable entry for someone to fix
        pool.record_outcome(&outcome_pairing(1, 2)).unwrap();
        let raw = pool.load_raw().unwrap();
        assert_eq!(raw.participants.len(), 1);
        assert_eq!(raw.participants[0]["joined_at"], "last tuesday");
        assert_eq!(raw.meetings.len(), 1);
    }

    #[test]
    fn test_json_pool_record_outcome_respects_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        let content = r#"{"participants": [
            {"id": 1, "role": "worker", "joined_at": "2024-05-01T08:00:00Z"},
            {"id": 2, "role": "worker", "joined_at": "2024-05-01T08:00:00Z"}
        ]}"#;
        std::fs::write(&path, content).unwrap();
        let lock = dir.path().join("pool.json.lock");

        // A sign-up writer holds the pool
        std::fs::write(&lock, "").unwrap();
        let pool = JsonPool::new(&path);
        assert!(matches!(
            pool.record_outcome(&outcome_pairing(1, 2)),
            Err(SourceError::Locked(_))
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);

        std::fs::remove_file(&lock).unwrap();
        pool.record_outcome(&outcome_pairing(1, 2)).unwrap();
        assert!(pool.load().unwrap().participants.is_empty());
        assert!(!lock.exists());
    }
}
