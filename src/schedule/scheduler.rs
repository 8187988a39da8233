use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::core::participant::Participant;
use crate::dispatch::{dispatch_outcome, DispatchSummary, Observer, OutcomeDispatcher, RunSummary};
use crate::matching::engine::{EngineError, MatchingEngine};
use crate::matching::outcome::MatchOutcome;
use crate::pool::{ParticipantSource, SourceError};
use crate::schedule::clock::Clock;
use crate::schedule::state::{NextRunStore, PersistenceError};

/// Default back-off before retrying after a persistence failure
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Time between two runs
#[must_use]
pub fn default_period() -> chrono::Duration {
    chrono::Duration::days(7)
}

/// What one cycle failed on
#[derive(Error, Debug)]
pub enum CycleError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CycleError {
    /// Persistence failures are retried after a short back-off
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

/// Whether the scheduler is waiting or inside a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Running,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Scheduler settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Time between two runs
    pub period: chrono::Duration,
    /// Wait before retrying after a persistence failure
    pub retry_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: default_period(),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Everything one completed cycle produced
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Scheduled time of this run (the previous next-run value)
    pub run_at: DateTime<Utc>,
    /// Next-run value committed before the pool was read
    pub next_run: DateTime<Utc>,
    pub outcome: MatchOutcome,
    pub dispatch: DispatchSummary,
    pub timed_out: bool,
}

/// External collaborators of the scheduler
pub struct Collaborators {
    pub store: Arc<dyn NextRunStore>,
    pub source: Arc<dyn ParticipantSource>,
    pub dispatcher: Arc<dyn OutcomeDispatcher>,
    pub observer: Arc<dyn Observer>,
    pub clock: Arc<dyn Clock>,
}

/// Weekly loop: wait for the next run, advance the state, match, notify
pub struct RunScheduler {
    store: Arc<dyn NextRunStore>,
    source: Arc<dyn ParticipantSource>,
    dispatcher: Arc<dyn OutcomeDispatcher>,
    observer: Arc<dyn Observer>,
    clock: Arc<dyn Clock>,
    engine: MatchingEngine,
    config: SchedulerConfig,
    state: SchedulerState,
}

impl RunScheduler {
    #[must_use]
    pub fn new(collaborators: Collaborators, engine: MatchingEngine, config: SchedulerConfig) -> Self {
        Self {
            store: collaborators.store,
            source: collaborators.source,
            dispatcher: collaborators.dispatcher,
            observer: collaborators.observer,
            clock: collaborators.clock,
            engine,
            config,
            state: SchedulerState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Wait until the next run is due, then execute it
    ///
    /// # Errors
    ///
    /// Returns the error that ended the cycle. A `Persistence` error means the state
    /// was not changed.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        loop {
            let due = self.wait_until_due().await?;
            if let Some(next_run) = self.claim(due).await? {
                return self.execute(due, next_run).await;
            }
        }
    }

    /// Run cycles until `shutdown` resolves. Shutdown interrupts the wait between
    /// runs, never a run in progress.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Scheduler started");

        loop {
            let waited = tokio::select! {
                () = &mut shutdown => break,
                waited = self.wait_until_due() => waited,
            };

            let claimed = match waited {
                Ok(due) => self.claim(due).await.map(|next_run| next_run.map(|next| (due, next))),
                Err(err) => Err(err),
            };

            let result = match claimed {
                Ok(Some((run_at, next_run))) => self.execute(run_at, next_run).await,
                Ok(None) => continue,
                Err(err) => Err(err),
            };

            match result {
                Ok(report) => debug!(
                    run_at = %report.run_at,
                    next_run = %report.next_run,
                    "Cycle finished"
                ),
                Err(err) if err.is_persistence() => {
                    let backoff = self.config.retry_backoff;
                    error!(error = %err, backoff_secs = backoff.as_secs(), "Next-run state unavailable, retrying");
                    self.observer
                        .alert(&format!("Next-run state unavailable: {err}"));
                    tokio::select! {
                        () = &mut shutdown => break,
                        () = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(err) => {
                    error!(error = %err, "Matching cycle failed");
                    self.observer.alert(&format!("Matching cycle failed: {err}"));
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Sleep until the stored next-run time and return it. Does not sleep if it has passed.
    async fn wait_until_due(&self) -> Result<DateTime<Utc>, CycleError> {
        let store = Arc::clone(&self.store);
        let next_run = tokio::task::spawn_blocking(move || store.get()).await??;

        let now = self.clock.now();
        if now < next_run {
            let wait = (next_run - now).to_std().unwrap_or_default();
            info!(%next_run, wait_secs = wait.as_secs(), "Waiting for next run");
            tokio::time::sleep(wait).await;
        }
        Ok(next_run)
    }

    /// Commit the run due at `due` by moving the state one period on.
    ///
    /// The commit happens before the pool is read, so a crash cannot repeat the run.
    /// Returns `None` when the state no longer holds `due`.
    async fn claim(&self, due: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, CycleError> {
        let period = self.config.period;
        let store = Arc::clone(&self.store);
        let claimed = tokio::task::spawn_blocking(move || store.advance_if(due, period)).await??;
        if claimed.is_none() {
            info!(%due, "Run already taken or rescheduled, waiting again");
        }
        Ok(claimed)
    }

    /// Read the pool, solve and dispatch the claimed run
    async fn execute(
        &mut self,
        run_at: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> Result<CycleReport, CycleError> {
        self.state = SchedulerState::Running;
        let result = self.execute_run(run_at, next_run).await;
        self.state = SchedulerState::Idle;
        result
    }

    async fn execute_run(
        &self,
        run_at: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> Result<CycleReport, CycleError> {
        info!(%run_at, %next_run, "Starting matching run");

        let source = Arc::clone(&self.source);
        let participants: Vec<Participant> =
            tokio::task::spawn_blocking(move || source.list_waiting(run_at)).await??;

        let engine = self.engine.clone();
        let solved = tokio::task::spawn_blocking(move || engine.solve(participants)).await?;
        let (outcome, timed_out) = match solved {
            Ok(outcome) => (outcome, false),
            Err(EngineError::Timeout {
                elapsed,
                best_effort,
            }) => {
                self.observer.alert(&format!(
                    "Matching budget exhausted after {}s; using best effort with {} pairs",
                    elapsed.as_secs(),
                    best_effort.pairs.len()
                ));
                (best_effort, true)
            }
            Err(err) => return Err(err.into()),
        };

        let dispatch = dispatch_outcome(Arc::clone(&self.dispatcher), &outcome, next_run).await;

        let source = Arc::clone(&self.source);
        let recorded = outcome.clone();
        match tokio::task::spawn_blocking(move || source.record_outcome(&recorded)).await? {
            Ok(()) => {}
            Err(err) => {
                warn!(error = %err, "Failed to record outcome in the pool");
                self.observer
                    .alert(&format!("Failed to record run outcome: {err}"));
            }
        }

        let summary = RunSummary::new(run_at, next_run, &outcome, dispatch.clone(), timed_out);
        self.observer.run_summary(&summary);

        Ok(CycleReport {
            run_at,
            next_run,
            outcome,
            dispatch,
            timed_out,
        })
    }
}
