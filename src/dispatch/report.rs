use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use crate::core::types::Role;
use crate::dispatch::DispatchSummary;
use crate::matching::outcome::{MatchOutcome, RoleCounts};

/// Operator-facing report for one completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// The scheduled time this run was for
    pub run_at: DateTime<Utc>,
    pub next_run: DateTime<Utc>,
    pub by_role: BTreeMap<Role, RoleCounts>,
    pub pairs: usize,
    pub total_weight: i64,
    /// True when the engine ran out of budget and a best-effort matching was used
    pub timed_out: bool,
    pub dispatch: DispatchSummary,
}

impl RunSummary {
    #[must_use]
    pub fn new(
        run_at: DateTime<Utc>,
        next_run: DateTime<Utc>,
        outcome: &MatchOutcome,
        dispatch: DispatchSummary,
        timed_out: bool,
    ) -> Self {
        Self {
            run_at,
            next_run,
            by_role: outcome.summary_by_role(),
            pairs: outcome.pairs.len(),
            total_weight: outcome.total_weight(),
            timed_out,
            dispatch,
        }
    }

    #[must_use]
    pub fn counts(&self, role: Role) -> RoleCounts {
        self.by_role.get(&role).copied().unwrap_or_default()
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let students = self.counts(Role::Student);
        let workers = self.counts(Role::Worker);
        write!(
            f,
            "students {}/{} matched ({} free), workers {}/{} matched ({} free), {} notification failures",
            students.matched,
            students.total,
            students.free,
            workers.matched,
            workers.total,
            workers.free,
            self.dispatch.failed()
        )
    }
}

/// Where operators hear about runs and failures
pub trait Observer: Send + Sync {
    /// Something unexpected happened and needs attention
    fn alert(&self, message: &str);

    /// A run finished
    fn run_summary(&self, summary: &RunSummary);
}

/// Reports through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn alert(&self, message: &str) {
        error!(alert = true, "{message}");
    }

    fn run_summary(&self, summary: &RunSummary) {
        let students = summary.counts(Role::Student);
        let workers = summary.counts(Role::Worker);
        info!(
            run_at = %summary.run_at,
            next_run = %summary.next_run,
            students = students.total,
            students_matched = students.matched,
            students_free = students.free,
            workers = workers.total,
            workers_matched = workers.matched,
            workers_free = workers.free,
            total_weight = summary.total_weight,
            "Run summary"
        );
        if !summary.dispatch.is_clean() {
            warn!(
                failed = summary.dispatch.failed(),
                "Some notifications were not delivered"
            );
        }
    }
}
