use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::types::{ParticipantId, Role};

/// A chosen meeting between two participants, normalized so that `low < high`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Pair {
    pub low: ParticipantId,
    pub high: ParticipantId,
    /// Edge weight the pair contributed
    pub weight: i64,
}

impl Pair {
    /// Build a pair from ids in any order
    #[must_use]
    pub fn new(a: ParticipantId, b: ParticipantId, weight: i64) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self { low, high, weight }
    }

    #[must_use]
    pub fn contains(&self, id: ParticipantId) -> bool {
        self.low == id || self.high == id
    }

    /// The other side of the pair, if `id` is in it
    #[must_use]
    pub fn partner_of(&self, id: ParticipantId) -> Option<ParticipantId> {
        if self.low == id {
            Some(self.high)
        } else if self.high == id {
            Some(self.low)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <-> {} (weight {})", self.low, self.high, self.weight)
    }
}

/// Matched pairs plus everyone left over
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    /// Disjoint pairs, sorted
    pub pairs: Vec<Pair>,
    /// Participants not in any pair, sorted
    pub free: Vec<ParticipantId>,
    /// Role of every participant in the run, used for reporting
    #[serde(skip)]
    roles: BTreeMap<ParticipantId, Role>,
}

impl MatchOutcome {
    /// Build an outcome, normalizing order. `roles` must list every participant.
    #[must_use]
    pub fn new(
        mut pairs: Vec<Pair>,
        mut free: Vec<ParticipantId>,
        roles: BTreeMap<ParticipantId, Role>,
    ) -> Self {
        pairs.sort();
        free.sort();
        Self { pairs, free, roles }
    }

    /// Outcome in which nobody is matched
    #[must_use]
    pub fn all_free(roles: BTreeMap<ParticipantId, Role>) -> Self {
        let free = roles.keys().copied().collect();
        Self {
            pairs: Vec::new(),
            free,
            roles,
        }
    }

    #[must_use]
    pub fn total_weight(&self) -> i64 {
        self.pairs.iter().map(|p| p.weight).sum()
    }

    /// Weight of the pair joining `a` and `b`, if they were matched together
    #[must_use]
    pub fn weight_of(&self, a: ParticipantId, b: ParticipantId) -> Option<i64> {
        let probe = Pair::new(a, b, 0);
        self.pairs
            .iter()
            .find(|p| p.low == probe.low && p.high == probe.high)
            .map(|p| p.weight)
    }

    /// Partner of `id` in this outcome
    #[must_use]
    pub fn partner_of(&self, id: ParticipantId) -> Option<ParticipantId> {
        self.pairs.iter().find_map(|p| p.partner_of(id))
    }

    /// Ids appearing in a pair, sorted
    #[must_use]
    pub fn matched_ids(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<ParticipantId> =
            self.pairs.iter().flat_map(|p| [p.low, p.high]).collect();
        ids.sort();
        ids
    }

    /// Number of participants in the run
    #[must_use]
    pub fn participant_count(&self) -> usize {
        2 * self.pairs.len() + self.free.len()
    }

    #[must_use]
    pub fn role_of(&self, id: ParticipantId) -> Option<Role> {
        self.roles.get(&id).copied()
    }

    /// Totals, matched and free counts per role
    #[must_use]
    pub fn summary_by_role(&self) -> BTreeMap<Role, RoleCounts> {
        let mut summary: BTreeMap<Role, RoleCounts> =
            Role::ALL.iter().map(|r| (*r, RoleCounts::default())).collect();

        for id in self.matched_ids() {
            if let Some(role) = self.role_of(id) {
                let counts = summary.entry(role).or_default();
                counts.total += 1;
                counts.matched += 1;
            }
        }
        for id in &self.free {
            if let Some(role) = self.role_of(*id) {
                let counts = summary.entry(role).or_default();
                counts.total += 1;
                counts.free += 1;
            }
        }
        summary
    }
}

/// Per-role participant counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleCounts {
    pub total: usize,
    pub matched: usize,
    pub free: usize,
}
