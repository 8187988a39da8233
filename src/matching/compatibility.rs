use serde::Serialize;

use crate::core::participant::Participant;
use crate::core::types::MeetingFormat;

/// Default weight added to every allowed pair on top of the interest overlap
pub const DEFAULT_WEIGHT_FLOOR: i64 = 1;

/// Why a pair may not meet. Variants are listed in the order the rules are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    /// Both sides are the same participant
    SameParticipant,
    /// The two have already had a meeting
    AlreadyMet,
    /// Student paired with worker
    RoleMismatch,
    /// They study in a common group
    SameGroup,
    /// They work in a common department
    SameWorkplace,
    /// One wants online only, the other offline only
    FormatMismatch,
    /// Offline-capable on both sides but no common place
    NoCommonPlace,
}

impl std::fmt::Display for Exclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::SameParticipant => "same participant",
            Self::AlreadyMet => "already met",
            Self::RoleMismatch => "different roles",
            Self::SameGroup => "share a group",
            Self::SameWorkplace => "share a workplace",
            Self::FormatMismatch => "online-only vs offline-only",
            Self::NoCommonPlace => "no common meeting place",
        };
        f.write_str(text)
    }
}

/// Result of evaluating one candidate pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Compatibility {
    Allowed { weight: i64 },
    Excluded { reason: Exclusion },
}

impl Compatibility {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Edge weight, defined only for allowed pairs
    #[must_use]
    pub fn weight(&self) -> Option<i64> {
        match self {
            Self::Allowed { weight } => Some(*weight),
            Self::Excluded { .. } => None,
        }
    }

    #[must_use]
    pub fn exclusion(&self) -> Option<Exclusion> {
        match self {
            Self::Allowed { .. } => None,
            Self::Excluded { reason } => Some(*reason),
        }
    }
}

/// Hard exclusion rules plus the interest-overlap score
///
/// Evaluation is a pure function of the two participants, so a single model can be
/// shared by reference across worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompatibilityModel {
    weight_floor: i64,
}

impl Default for CompatibilityModel {
    fn default() -> Self {
        Self {
            weight_floor: DEFAULT_WEIGHT_FLOOR,
        }
    }
}

impl CompatibilityModel {
    #[must_use]
    pub fn new(weight_floor: i64) -> Self {
        Self { weight_floor }
    }

    #[must_use]
    pub fn weight_floor(&self) -> i64 {
        self.weight_floor
    }

    /// Evaluate a candidate pair. The result does not depend on argument order.
    #[must_use]
    pub fn evaluate(&self, a: &Participant, b: &Participant) -> Compatibility {
        match first_exclusion(a, b) {
            Some(reason) => Compatibility::Excluded { reason },
            None => Compatibility::Allowed {
                weight: self.score(a, b),
            },
        }
    }

    /// Overlap score for a pair that passed every rule
    fn score(&self, a: &Participant, b: &Participant) -> i64 {
        let shared = i64::try_from(a.shared_interests(b)).unwrap_or(i64::MAX);
        shared.saturating_add(self.weight_floor)
    }
}

/// Check the rules in order and return the first one that fails
fn first_exclusion(a: &Participant, b: &Participant) -> Option<Exclusion> {
    if a.id == b.id {
        return Some(Exclusion::SameParticipant);
    }

    // Checked both ways so the verdict stays symmetric on one-sided history
    if a.has_met(b.id) || b.has_met(a.id) {
        return Some(Exclusion::AlreadyMet);
    }

    if a.role != b.role {
        return Some(Exclusion::RoleMismatch);
    }

    if !a.groups.is_disjoint(&b.groups) {
        return Some(Exclusion::SameGroup);
    }
    if !a.workplaces.is_disjoint(&b.workplaces) {
        return Some(Exclusion::SameWorkplace);
    }

    if formats_conflict(a.meeting_format, b.meeting_format) {
        return Some(Exclusion::FormatMismatch);
    }

    if needs_common_place(a.meeting_format, b.meeting_format)
        && a.preferred_places.is_disjoint(&b.preferred_places)
    {
        return Some(Exclusion::NoCommonPlace);
    }

    None
}

fn formats_conflict(a: MeetingFormat, b: MeetingFormat) -> bool {
    matches!(
        (a, b),
        (MeetingFormat::Online, MeetingFormat::Offline)
            | (MeetingFormat::Offline, MeetingFormat::Online)
    )
}

/// Places matter when nobody is strictly online, unless both accept any format
fn needs_common_place(a: MeetingFormat, b: MeetingFormat) -> bool {
    a.uses_places() && b.uses_places() && !(a == MeetingFormat::Any && b == MeetingFormat::Any)
}
