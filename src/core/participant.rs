use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::types::{Interest, MeetingFormat, ParticipantId, Place, Role};

/// One waiting participant as seen by a single matching run
///
/// Sets are ordered so that everything derived from a snapshot (graph edges,
/// tie-breaks, output) is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Stable identifier
    pub id: ParticipantId,

    /// Student or worker
    pub role: Role,

    /// Interest tags used for the overlap score
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub interests: BTreeSet<Interest>,

    /// Online, offline or either
    #[serde(default)]
    pub meeting_format: MeetingFormat,

    /// Places for offline meetings (ignored when the format is online)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub preferred_places: BTreeSet<Place>,

    /// Study groups / faculties
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub groups: BTreeSet<String>,

    /// Workplaces / departments
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub workplaces: BTreeSet<String>,

    /// Participants already met ("homies"), never paired again
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded: BTreeSet<ParticipantId>,
}

impl Participant {
    /// Create a participant with no preferences (format `Any`)
    pub fn new(id: impl Into<ParticipantId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            interests: BTreeSet::new(),
            meeting_format: MeetingFormat::Any,
            preferred_places: BTreeSet::new(),
            groups: BTreeSet::new(),
            workplaces: BTreeSet::new(),
            excluded: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_interests(mut self, interests: impl IntoIterator<Item = Interest>) -> Self {
        self.interests.extend(interests);
        self
    }

    #[must_use]
    pub fn with_format(mut self, meeting_format: MeetingFormat) -> Self {
        self.meeting_format = meeting_format;
        self
    }

    #[must_use]
    pub fn with_places(mut self, places: impl IntoIterator<Item = Place>) -> Self {
        self.preferred_places.extend(places);
        self
    }

    #[must_use]
    pub fn with_groups<S: Into<String>>(mut self, groups: impl IntoIterator<Item = S>) -> Self {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_workplaces<S: Into<String>>(
        mut self,
        workplaces: impl IntoIterator<Item = S>,
    ) -> Self {
        self.workplaces.extend(workplaces.into_iter().map(Into::into));
        self
    }

    /// Add already-met participants. The participant's own id is dropped.
    #[must_use]
    pub fn with_excluded<I: Into<ParticipantId>>(
        mut self,
        excluded: impl IntoIterator<Item = I>,
    ) -> Self {
        let own = self.id;
        self.excluded
            .extend(excluded.into_iter().map(Into::into).filter(|id| *id != own));
        self
    }

    /// Whether `other` is on this participant's exclusion list
    #[must_use]
    pub fn has_met(&self, other: ParticipantId) -> bool {
        self.excluded.contains(&other)
    }

    /// Number of interests shared with `other`
    #[must_use]
    pub fn shared_interests(&self, other: &Participant) -> usize {
        self.interests.intersection(&other.interests).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_excluded_drops_self() {
        let p = Participant::new(1, Role::Student).with_excluded([1, 2, 3]);
        assert!(!p.has_met(ParticipantId(1)));
        assert!(p.has_met(ParticipantId(2)));
        assert_eq!(p.excluded.len(), 2);
    }

    #[test]
    fn test_shared_interests() {
        let a = Participant::new(1, Role::Worker)
            .with_interests([Interest::Art, Interest::Books, Interest::Music]);
        let b = Participant::new(2, Role::Worker).with_interests([Interest::Books, Interest::Music]);
        assert_eq!(a.shared_interests(&b), 2);
        assert_eq!(b.shared_interests(&a), 2);
    }

    #[test]
    fn test_serde_defaults() {
        let json = r#"{"id": 7, "role": "worker"}"#;
        let p: Participant = serde_json::from_str(json).unwrap();
        assert_eq!(p.id, ParticipantId(7));
        assert_eq!(p.meeting_format, MeetingFormat::Any);
        assert!(p.interests.is_empty());
    }
}
