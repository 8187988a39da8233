use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::participant::Participant;
use crate::core::types::{ParticipantId, Role};
use crate::matching::blossom::{max_weight_matching, WeightedEdge};
use crate::matching::compatibility::{Compatibility, CompatibilityModel, DEFAULT_WEIGHT_FLOOR};
use crate::matching::graph::CompatibilityGraph;
use crate::matching::outcome::{MatchOutcome, Pair};

/// Default wall-clock budget for one solve
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(10 * 60);

#[derive(Error, Debug)]
pub enum EngineError {
    /// The budget ran out (or the run was cancelled) before optimality was proven.
    /// `best_effort` is still a valid matching over the same participants.
    #[error("Matching stopped after {elapsed:?} without proving optimality ({} pairs found)", best_effort.pairs.len())]
    Timeout {
        elapsed: Duration,
        best_effort: MatchOutcome,
    },

    #[error("Participant {0} appears more than once in the snapshot")]
    DuplicateParticipant(ParticipantId),

    #[error("Invalid engine config: {0}")]
    InvalidConfig(String),
}

/// Tunables for [`MatchingEngine`]
///
/// Deserializes from JSON with every field optional:
///
/// ```json
/// { "time_limit_secs": 600, "weight_floor": 1, "workers": 4 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wall-clock budget for one solve
    #[serde(rename = "time_limit_secs", with = "duration_secs")]
    pub time_limit: Duration,

    /// Added to the interest overlap of every allowed pair
    pub weight_floor: i64,

    /// Threads used to build the compatibility graph of large pools
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_limit: DEFAULT_TIME_LIMIT,
            weight_floor: DEFAULT_WEIGHT_FLOOR,
            workers: std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file; missing fields take their defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails validation.
    pub fn load(path: &std::path::Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            EngineError::InvalidConfig(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    #[must_use]
    pub fn with_weight_floor(mut self, weight_floor: i64) -> Self {
        self.weight_floor = weight_floor;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// # Errors
    ///
    /// Returns `InvalidConfig` for a negative weight floor or zero workers.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.weight_floor < 0 {
            return Err(EngineError::InvalidConfig(format!(
                "weight_floor must be >= 0, got {}",
                self.weight_floor
            )));
        }
        if self.workers == 0 {
            return Err(EngineError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Shared flag to abort a running solve from another thread
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Pairs a snapshot of waiting participants by maximum total weight
#[derive(Debug, Clone)]
pub struct MatchingEngine {
    config: EngineConfig,
    model: CompatibilityModel,
    cancel: Option<CancelFlag>,
}

impl MatchingEngine {
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the config does not validate.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let model = CompatibilityModel::new(config.weight_floor);
        Ok(Self {
            config,
            model,
            cancel: None,
        })
    }

    /// Attach a flag that stops the search early when set
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn model(&self) -> &CompatibilityModel {
        &self.model
    }

    /// Evaluate one candidate pair with this engine's model
    #[must_use]
    pub fn evaluate(&self, a: &Participant, b: &Participant) -> Compatibility {
        self.model.evaluate(a, b)
    }

    /// Compute a maximum-weight set of disjoint allowed pairs.
    ///
    /// Every participant ends up either in exactly one pair or in `free`.
    ///
    /// # Errors
    ///
    /// - `DuplicateParticipant` if an id occurs twice
    /// - `Timeout` if the budget ran out or the cancel flag was set; the error
    ///   carries a valid best-effort outcome
    pub fn solve(&self, mut participants: Vec<Participant>) -> Result<MatchOutcome, EngineError> {
        let started = Instant::now();
        let deadline = started.checked_add(self.config.time_limit);

        participants.sort_by_key(|p| p.id);
        if let Some(dup) = participants.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(EngineError::DuplicateParticipant(dup[0].id));
        }

        let roles: BTreeMap<ParticipantId, Role> =
            participants.iter().map(|p| (p.id, p.role)).collect();
        if participants.len() < 2 {
            return Ok(MatchOutcome::all_free(roles));
        }

        let graph = CompatibilityGraph::build(participants, &self.model, self.config.workers);
        let cancel = self.cancel.clone();
        let should_stop = || {
            cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
                || deadline.is_some_and(|d| Instant::now() >= d)
        };

        let result = max_weight_matching(graph.vertex_count(), graph.edges(), should_stop);
        let mut mates = result.mates;

        if !result.complete {
            fill_greedily(graph.edges(), &mut mates);
            let best_effort = to_outcome(&graph, &mates, roles);
            let elapsed = started.elapsed();
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                pairs = best_effort.pairs.len(),
                "Matching budget exhausted, returning best effort"
            );
            return Err(EngineError::Timeout {
                elapsed,
                best_effort,
            });
        }

        let outcome = to_outcome(&graph, &mates, roles);
        info!(
            participants = outcome.participant_count(),
            pairs = outcome.pairs.len(),
            free = outcome.free.len(),
            total_weight = outcome.total_weight(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Matching complete"
        );
        Ok(outcome)
    }
}

/// Add the heaviest remaining edges between unmatched vertices
fn fill_greedily(edges: &[WeightedEdge], mates: &mut [Option<usize>]) {
    let mut order: Vec<&WeightedEdge> = edges.iter().filter(|e| e.weight > 0).collect();
    order.sort_by(|a, b| b.weight.cmp(&a.weight).then((a.u, a.v).cmp(&(b.u, b.v))));

    let mut added = 0usize;
    for edge in order {
        if mates[edge.u].is_none() && mates[edge.v].is_none() {
            mates[edge.u] = Some(edge.v);
            mates[edge.v] = Some(edge.u);
            added += 1;
        }
    }
    debug!(added, "Greedy fill after interrupted search");
}

fn to_outcome(
    graph: &CompatibilityGraph,
    mates: &[Option<usize>],
    roles: BTreeMap<ParticipantId, Role>,
) -> MatchOutcome {
    let participants = graph.participants();

    // Each matched pair is backed by exactly one edge since edges are unique per (u, v)
    let pairs: Vec<Pair> = graph
        .edges()
        .iter()
        .filter(|e| mates[e.u] == Some(e.v))
        .map(|e| Pair::new(participants[e.u].id, participants[e.v].id, e.weight))
        .collect();

    let free: Vec<ParticipantId> = mates
        .iter()
        .enumerate()
        .filter(|(_, mate)| mate.is_none())
        .map(|(i, _)| participants[i].id)
        .collect();

    MatchOutcome::new(pairs, free, roles)
}
