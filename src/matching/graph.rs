use std::thread;

use tracing::{debug, trace};

use crate::core::participant::Participant;
use crate::matching::blossom::WeightedEdge;
use crate::matching::compatibility::{Compatibility, CompatibilityModel};

/// Pools at least this large have their rows evaluated on worker threads
pub const PARALLEL_THRESHOLD: usize = 256;

/// Allowed edges between the participants of one run
///
/// Vertex `i` is `participants()[i]`; participants are ordered by id and edges are
/// ordered by `(u, v)` with `u < v`, so the graph is identical for identical input.
#[derive(Debug, Clone)]
pub struct CompatibilityGraph {
    participants: Vec<Participant>,
    edges: Vec<WeightedEdge>,
}

impl CompatibilityGraph {
    /// Evaluate every unordered pair. `participants` must be sorted by id without duplicates.
    #[must_use]
    pub fn build(participants: Vec<Participant>, model: &CompatibilityModel, workers: usize) -> Self {
        let workers = workers.max(1);
        let edges = if workers > 1 && participants.len() >= PARALLEL_THRESHOLD {
            build_parallel(&participants, model, workers)
        } else {
            build_rows(&participants, model, 0, 1)
        };

        debug!(
            participants = participants.len(),
            edges = edges.len(),
            "Built compatibility graph"
        );

        Self {
            participants,
            edges,
        }
    }

    #[must_use]
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    #[must_use]
    pub fn edges(&self) -> &[WeightedEdge] {
        &self.edges
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.participants.len()
    }
}

/// Rows `first, first + step, ...` of the upper triangle
fn build_rows(
    participants: &[Participant],
    model: &CompatibilityModel,
    first: usize,
    step: usize,
) -> Vec<WeightedEdge> {
    let mut edges = Vec::new();
    for i in (first..participants.len()).step_by(step) {
        for j in (i + 1)..participants.len() {
            match model.evaluate(&participants[i], &participants[j]) {
                Compatibility::Allowed { weight } => edges.push(WeightedEdge::new(i, j, weight)),
                Compatibility::Excluded { reason } => {
                    trace!(
                        a = %participants[i].id,
                        b = %participants[j].id,
                        %reason,
                        "Pair excluded"
                    );
                }
            }
        }
    }
    edges
}

/// Interleave rows across workers (row lengths shrink, so this balances the load)
fn build_parallel(
    participants: &[Participant],
    model: &CompatibilityModel,
    workers: usize,
) -> Vec<WeightedEdge> {
    let mut edges: Vec<WeightedEdge> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|first| scope.spawn(move || build_rows(participants, model, first, workers)))
            .collect();
        handles
            .into_iter()
            .flat_map(|h| match h.join() {
                Ok(rows) => rows,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });
    edges.sort_by_key(|e| (e.u, e.v));
    edges
}
