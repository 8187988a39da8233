use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::core::participant::Participant;
use crate::core::types::{Interest, MeetingFormat, ParticipantId, Place, Role};
use crate::pool::DataError;
use crate::utils::validation::{check_pool_size, normalize_labels, parse_tags};

/// A participant as stored in the pool, before validation
///
/// Tags are kept as strings so that an unknown value only drops its own record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub id: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default)]
    pub interests: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_format: Option<String>,

    #[serde(default)]
    pub preferred_places: Vec<String>,

    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(default)]
    pub workplaces: Vec<String>,

    /// When the participant entered the queue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
}

/// A meeting assigned by an earlier run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingRecord {
    pub a: i64,
    pub b: i64,
    /// Set once feedback confirmed the meeting happened
    #[serde(default)]
    pub took_place: bool,
}

/// A pool file as stored on disk, entries not yet typed
///
/// Entries stay raw JSON so that a badly typed record can be skipped on its own
/// and is written back untouched when the pool is updated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPool {
    #[serde(default)]
    pub participants: Vec<Value>,

    #[serde(default)]
    pub meetings: Vec<Value>,
}

/// Everything stored in a pool file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolData {
    #[serde(default)]
    pub participants: Vec<ParticipantRecord>,

    #[serde(default)]
    pub meetings: Vec<MeetingRecord>,

    /// Entries that could not be read as records
    #[serde(skip)]
    pub malformed: Vec<DataError>,
}

/// Validated participants for one run plus the records that were dropped
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Sorted by id, ids unique
    pub participants: Vec<Participant>,
    pub skipped: Vec<DataError>,
}

impl ParticipantRecord {
    /// Validate the record, attaching the already-met set from `history`
    ///
    /// # Errors
    ///
    /// Returns a `DataError` naming the first missing field or unknown value.
    pub fn validate(
        &self,
        history: &BTreeMap<ParticipantId, BTreeSet<ParticipantId>>,
    ) -> Result<(Participant, DateTime<Utc>), DataError> {
        let id = ParticipantId(self.id);

        let raw_role = self
            .role
            .as_deref()
            .ok_or(DataError::MissingField { id, field: "role" })?;
        let role = Role::parse(raw_role).ok_or_else(|| DataError::UnknownTag {
            id,
            kind: "role",
            value: raw_role.to_string(),
        })?;

        let joined_at = self.joined_at.ok_or(DataError::MissingField {
            id,
            field: "joined_at",
        })?;

        let meeting_format = match self.meeting_format.as_deref() {
            None => MeetingFormat::default(),
            Some(raw) => MeetingFormat::parse(raw).ok_or_else(|| DataError::UnknownTag {
                id,
                kind: "meeting format",
                value: raw.to_string(),
            })?,
        };

        let unknown = |kind: &'static str| move |value: String| DataError::UnknownTag { id, kind, value };
        let invalid = |kind: &'static str| move |value: String| DataError::InvalidLabel { id, kind, value };

        let interests: BTreeSet<Interest> =
            parse_tags(&self.interests, Interest::parse).map_err(unknown("interest"))?;
        let places: BTreeSet<Place> =
            parse_tags(&self.preferred_places, Place::parse).map_err(unknown("place"))?;
        let groups = normalize_labels(&self.groups).map_err(invalid("group"))?;
        let workplaces = normalize_labels(&self.workplaces).map_err(invalid("workplace"))?;

        let excluded = history.get(&id).cloned().unwrap_or_default();

        let participant = Participant::new(id, role)
            .with_interests(interests)
            .with_format(meeting_format)
            .with_places(places)
            .with_groups(groups)
            .with_workplaces(workplaces)
            .with_excluded(excluded);

        Ok((participant, joined_at))
    }
}

/// Type each entry on its own, collecting the ones that fail
fn typed_entries<T: DeserializeOwned>(
    entries: &[Value],
    kind: &'static str,
    malformed: &mut Vec<DataError>,
) -> Vec<T> {
    let mut typed = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match T::deserialize(entry) {
            Ok(record) => typed.push(record),
            Err(e) => {
                let err = DataError::Malformed {
                    kind,
                    index,
                    reason: e.to_string(),
                };
                warn!(%err, "Skipping pool record");
                malformed.push(err);
            }
        }
    }
    typed
}

impl From<&RawPool> for PoolData {
    fn from(raw: &RawPool) -> Self {
        let mut malformed = Vec::new();
        let participants = typed_entries(&raw.participants, "participant", &mut malformed);
        let meetings = typed_entries(&raw.meetings, "meeting", &mut malformed);
        Self {
            participants,
            meetings,
            malformed,
        }
    }
}

impl PoolData {
    /// Already-met sets derived from meetings that took place, in both directions
    #[must_use]
    pub fn history(&self) -> BTreeMap<ParticipantId, BTreeSet<ParticipantId>> {
        let mut history: BTreeMap<ParticipantId, BTreeSet<ParticipantId>> = BTreeMap::new();
        for meeting in self.meetings.iter().filter(|m| m.took_place && m.a != m.b) {
            let (a, b) = (ParticipantId(meeting.a), ParticipantId(meeting.b));
            history.entry(a).or_default().insert(b);
            history.entry(b).or_default().insert(a);
        }
        history
    }
}

/// Build the snapshot of everyone who joined strictly before `before`.
///
/// Malformed, invalid and duplicate records are skipped with a warning. A duplicated
/// id keeps its first valid record.
#[must_use]
pub fn build_snapshot(data: &PoolData, before: DateTime<Utc>) -> Snapshot {
    if let Some(message) = check_pool_size(data.participants.len()) {
        warn!("{message}");
        return Snapshot {
            participants: Vec::new(),
            skipped: vec![DataError::TooLarge(message)],
        };
    }

    let history = data.history();
    let mut seen: BTreeSet<ParticipantId> = BTreeSet::new();
    let mut snapshot = Snapshot {
        participants: Vec::new(),
        skipped: data.malformed.clone(),
    };
    let mut late = 0usize;

    for record in &data.participants {
        let (participant, joined_at) = match record.validate(&history) {
            Ok(valid) => valid,
            Err(err) => {
                warn!(%err, "Skipping pool record");
                snapshot.skipped.push(err);
                continue;
            }
        };

        if !seen.insert(participant.id) {
            let err = DataError::Duplicate { id: participant.id };
            warn!(%err, "Skipping pool record");
            snapshot.skipped.push(err);
            continue;
        }

        if joined_at >= before {
            late += 1;
            debug!(id = %participant.id, %joined_at, "Joined after the cutoff, waiting for next run");
            continue;
        }

        snapshot.participants.push(participant);
    }

    snapshot.participants.sort_by_key(|p| p.id);
    info!(
        waiting = snapshot.participants.len(),
        late,
        skipped = snapshot.skipped.len(),
        cutoff = %before,
        "Built pool snapshot"
    );
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn record(id: i64, role: &str, joined: u32) -> ParticipantRecord {
        ParticipantRecord {
            id,
            role: Some(role.to_string()),
            interests: vec!["music".to_string()],
            meeting_format: None,
            preferred_places: Vec::new(),
            groups: Vec::new(),
            workplaces: Vec::new(),
            joined_at: Some(at(joined)),
        }
    }

    #[test]
    fn test_cutoff_is_strict() {
        let data = PoolData {
            participants: vec![record(1, "worker", 8), record(2, "worker", 10)],
            meetings: Vec::new(),
            malformed: Vec::new(),
        };
        let snapshot = build_snapshot(&data, at(10));
        let ids: Vec<i64> = snapshot.participants.iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec![1]);
        assert!(snapshot.skipped.is_empty());
    }

    #[test]
    fn test_bad_records_skipped_not_fatal() {
        let mut unknown_interest = record(2, "worker", 8);
        unknown_interest.interests.push("knitting".to_string());
        let mut no_role = record(3, "worker", 8);
        no_role.role = None;
        let mut blank_group = record(4, "student", 8);
        blank_group.groups.push("  ".to_string());

        let data = PoolData {
            participants: vec![record(1, "worker", 8), unknown_interest, no_role, blank_group],
            meetings: Vec::new(),
            malformed: Vec::new(),
        };
        let snapshot = build_snapshot(&data, at(12));

        assert_eq!(snapshot.participants.len(), 1);
        assert_eq!(snapshot.skipped.len(), 3);
        assert!(snapshot.skipped.contains(&DataError::UnknownTag {
            id: ParticipantId(2),
            kind: "interest",
            value: "knitting".to_string(),
        }));
        assert!(snapshot.skipped.contains(&DataError::MissingField {
            id: ParticipantId(3),
            field: "role",
        }));
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let data = PoolData {
            participants: vec![record(1, "worker", 8), record(1, "student", 9)],
            meetings: Vec::new(),
            malformed: Vec::new(),
        };
        let snapshot = build_snapshot(&data, at(12));
        assert_eq!(snapshot.participants.len(), 1);
        assert_eq!(snapshot.participants[0].role, Role::Worker);
        assert_eq!(
            snapshot.skipped,
            vec![DataError::Duplicate {
                id: ParticipantId(1)
            }]
        );
    }

    #[test]
    fn test_history_is_symmetric_and_needs_took_place() {
        let data = PoolData {
            participants: vec![record(1, "worker", 8), record(2, "worker", 8), record(3, "worker", 8)],
            meetings: vec![
                MeetingRecord {
                    a: 1,
                    b: 2,
                    took_place: true,
                },
                MeetingRecord {
                    a: 1,
                    b: 3,
                    took_place: false,
                },
            ],
            malformed: Vec::new(),
        };
        let snapshot = build_snapshot(&data, at(12));
        let p1 = &snapshot.participants[0];
        let p2 = &snapshot.participants[1];
        assert!(p1.has_met(ParticipantId(2)));
        assert!(p2.has_met(ParticipantId(1)));
        assert!(!p1.has_met(ParticipantId(3)));
    }

    #[test]
    fn test_parse_pool_json() {
        let json = r#"{
            "participants": [
                {"id": 7, "role": "student", "interests": ["self-development"],
                 "meeting_format": "offline", "preferred_places": ["campus"],
                 "groups": ["M3100"], "joined_at": "2024-05-01T08:00:00Z"}
            ]
        }"#;
        let data: PoolData = serde_json::from_str(json).unwrap();
        let snapshot = build_snapshot(&data, at(12));
        let p = &snapshot.participants[0];
        assert_eq!(p.meeting_format, MeetingFormat::Offline);
        assert!(p.preferred_places.contains(&Place::Campus));
        assert!(p.interests.contains(&Interest::SelfDevelopment));
        assert!(p.groups.contains("M3100"));
    }

    #[test]
    fn test_badly_typed_entries_only_drop_themselves() {
        let json = r#"{
            "participants": [
                {"id": 1, "role": "worker", "joined_at": "2024-05-01T08:00:00Z"},
                {"id": 2, "role": "worker", "joined_at": "2024-05-01T08:00:00Z"},
                {"id": 3, "role": "worker", "joined_at": "last tuesday"},
                {"id": "x", "role": 5}
            ],
            "meetings": [
                {"a": 1, "b": 2, "took_place": true},
                {"a": "one", "b": 2}
            ]
        }"#;
        let raw: RawPool = serde_json::from_str(json).unwrap();
        let data = PoolData::from(&raw);
        assert_eq!(data.participants.len(), 2);
        assert_eq!(data.meetings.len(), 1);

        let snapshot = build_snapshot(&data, at(12));
        let ids: Vec<i64> = snapshot.participants.iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(snapshot.participants[0].has_met(ParticipantId(2)));

        let malformed: Vec<(&str, usize)> = snapshot
            .skipped
            .iter()
            .filter_map(|err| match err {
                DataError::Malformed { kind, index, .. } => Some((*kind, *index)),
                _ => None,
            })
            .collect();
        assert_eq!(malformed, vec![("participant", 2), ("participant", 3), ("meeting", 1)]);
    }
}
