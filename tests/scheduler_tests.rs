//! Scheduler cycle tests with in-memory collaborators
//!
//! Tokio time is paused, so waiting a week for the next run completes immediately.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use pair_solver::dispatch::{DispatchError, Observer, OutcomeDispatcher, RunSummary};
use pair_solver::pool::MemoryPool;
use pair_solver::schedule::{
    Collaborators, FixedClock, MemoryNextRunStore, NextRunStore, PersistenceError, RunScheduler,
    SchedulerConfig,
};
use pair_solver::{EngineConfig, Interest, MatchingEngine, Participant, ParticipantId, Role};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap()
}

#[derive(Default)]
struct RecordingDispatcher {
    matches: Mutex<Vec<(ParticipantId, ParticipantId)>>,
    unmatched: Mutex<Vec<(ParticipantId, DateTime<Utc>)>>,
}

impl OutcomeDispatcher for RecordingDispatcher {
    fn notify_match(&self, a: ParticipantId, b: ParticipantId) -> Result<(), DispatchError> {
        self.matches.lock().unwrap().push((a, b));
        Ok(())
    }

    fn notify_unmatched(
        &self,
        participant: ParticipantId,
        next_run: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        self.unmatched.lock().unwrap().push((participant, next_run));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingObserver {
    alerts: Mutex<Vec<String>>,
    summaries: Mutex<Vec<RunSummary>>,
}

impl Observer for RecordingObserver {
    fn alert(&self, message: &str) {
        self.alerts.lock().unwrap().push(message.to_string());
    }

    fn run_summary(&self, summary: &RunSummary) {
        self.summaries.lock().unwrap().push(summary.clone());
    }
}

/// Store whose first `get` fails as if the state file were locked
struct FlakyStore {
    inner: MemoryNextRunStore,
    failures_left: AtomicUsize,
}

impl NextRunStore for FlakyStore {
    fn get(&self) -> Result<DateTime<Utc>, PersistenceError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PersistenceError::Locked("state.json.lock".into()));
        }
        self.inner.get()
    }

    fn advance_if(
        &self,
        expected: DateTime<Utc>,
        by: chrono::Duration,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        self.inner.advance_if(expected, by)
    }

    fn initialize(&self, at: DateTime<Utc>) -> Result<(), PersistenceError> {
        self.inner.initialize(at)
    }
}

/// Store whose first two `get` calls wait for each other, so two schedulers
/// both read the same next-run time before either advances it
struct RendezvousStore {
    inner: MemoryNextRunStore,
    barrier: Barrier,
    gets: AtomicUsize,
}

impl NextRunStore for RendezvousStore {
    fn get(&self) -> Result<DateTime<Utc>, PersistenceError> {
        if self.gets.fetch_add(1, Ordering::SeqCst) < 2 {
            self.barrier.wait();
        }
        self.inner.get()
    }

    fn advance_if(
        &self,
        expected: DateTime<Utc>,
        by: chrono::Duration,
    ) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        self.inner.advance_if(expected, by)
    }

    fn initialize(&self, at: DateTime<Utc>) -> Result<(), PersistenceError> {
        self.inner.initialize(at)
    }
}

struct Harness {
    pool: Arc<MemoryPool>,
    dispatcher: Arc<RecordingDispatcher>,
    observer: Arc<RecordingObserver>,
}

impl Harness {
    fn new() -> Self {
        Self {
            pool: Arc::new(MemoryPool::new()),
            dispatcher: Arc::new(RecordingDispatcher::default()),
            observer: Arc::new(RecordingObserver::default()),
        }
    }

    fn scheduler(
        &self,
        store: Arc<dyn NextRunStore>,
        now: DateTime<Utc>,
        engine: EngineConfig,
    ) -> RunScheduler {
        RunScheduler::new(
            Collaborators {
                store,
                source: self.pool.clone(),
                dispatcher: self.dispatcher.clone(),
                observer: self.observer.clone(),
                clock: Arc::new(FixedClock::new(now)),
            },
            MatchingEngine::new(engine.with_workers(1)).unwrap(),
            SchedulerConfig::default(),
        )
    }
}

fn student(id: i64) -> Participant {
    Participant::new(id, Role::Student).with_interests([Interest::Science])
}

#[tokio::test(start_paused = true)]
async fn test_due_run_advances_state_and_skips_late_joiners() {
    let harness = Harness::new();
    harness.pool.add(student(1), t0() - chrono::Duration::days(2));
    harness.pool.add(student(2), t0() - chrono::Duration::hours(3));
    harness.pool.add(student(3), t0() + chrono::Duration::milliseconds(500));

    let store = Arc::new(MemoryNextRunStore::new(t0()));
    let mut scheduler = harness.scheduler(
        store.clone(),
        t0() + chrono::Duration::seconds(1),
        EngineConfig::default(),
    );

    let report = scheduler.run_cycle().await.unwrap();

    assert_eq!(report.run_at, t0());
    assert_eq!(report.next_run, t0() + chrono::Duration::days(7));
    assert_eq!(store.get().unwrap(), t0() + chrono::Duration::days(7));

    assert_eq!(report.outcome.participant_count(), 2);
    assert_eq!(
        *harness.dispatcher.matches.lock().unwrap(),
        vec![(ParticipantId(1), ParticipantId(2))]
    );
    assert!(harness.dispatcher.unmatched.lock().unwrap().is_empty());

    // The late joiner stays queued for the next run
    assert_eq!(harness.pool.len(), 1);
    assert!(harness.observer.alerts.lock().unwrap().is_empty());

    let summaries = harness.observer.summaries.lock().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].counts(Role::Student).matched, 2);
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_future_run() {
    let harness = Harness::new();
    harness.pool.add(student(1), t0() - chrono::Duration::days(1));

    let store = Arc::new(MemoryNextRunStore::new(t0()));
    let mut scheduler = harness.scheduler(
        store.clone(),
        t0() - chrono::Duration::hours(1),
        EngineConfig::default(),
    );

    let started = tokio::time::Instant::now();
    let report = scheduler.run_cycle().await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(3600));
    assert_eq!(report.run_at, t0());
    assert_eq!(
        *harness.dispatcher.unmatched.lock().unwrap(),
        vec![(ParticipantId(1), t0() + chrono::Duration::days(7))]
    );
}

#[tokio::test(start_paused = true)]
async fn test_missed_runs_catch_up_one_period_at_a_time() {
    let harness = Harness::new();
    let store = Arc::new(MemoryNextRunStore::new(t0()));
    let mut scheduler = harness.scheduler(
        store.clone(),
        t0() + chrono::Duration::days(15),
        EngineConfig::default(),
    );

    let first = scheduler.run_cycle().await.unwrap();
    let second = scheduler.run_cycle().await.unwrap();

    assert_eq!(first.run_at, t0());
    assert_eq!(second.run_at, t0() + chrono::Duration::days(7));
    assert_eq!(store.get().unwrap(), t0() + chrono::Duration::days(14));
}

#[tokio::test(start_paused = true)]
async fn test_persistence_failure_is_retried_after_backoff() {
    let harness = Harness::new();
    harness.pool.add(student(1), t0() - chrono::Duration::days(1));
    harness.pool.add(student(2), t0() - chrono::Duration::days(1));

    let store = Arc::new(FlakyStore {
        inner: MemoryNextRunStore::new(t0()),
        failures_left: AtomicUsize::new(1),
    });
    let mut scheduler = harness.scheduler(
        store.clone(),
        t0() + chrono::Duration::seconds(1),
        EngineConfig::default(),
    );

    // Long enough for the back-off and the first run, well short of the second run
    scheduler
        .run_until(tokio::time::sleep(Duration::from_secs(3600)))
        .await;

    let alerts = harness.observer.alerts.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains("unavailable"), "{}", alerts[0]);

    assert_eq!(harness.dispatcher.matches.lock().unwrap().len(), 1);
    assert_eq!(store.get().unwrap(), t0() + chrono::Duration::days(7));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_budget_alerts_and_uses_best_effort() {
    let harness = Harness::new();
    for id in 1..=6 {
        harness.pool.add(student(id), t0() - chrono::Duration::days(1));
    }

    let store = Arc::new(MemoryNextRunStore::new(t0()));
    let mut scheduler = harness.scheduler(
        store,
        t0(),
        EngineConfig::default().with_time_limit(Duration::ZERO),
    );

    let report = scheduler.run_cycle().await.unwrap();

    assert!(report.timed_out);
    assert_eq!(report.outcome.pairs.len(), 3);
    assert_eq!(harness.dispatcher.matches.lock().unwrap().len(), 3);

    let alerts = harness.observer.alerts.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains("best effort"), "{}", alerts[0]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_wait() {
    let harness = Harness::new();
    let store = Arc::new(MemoryNextRunStore::new(t0() + chrono::Duration::days(3)));
    let mut scheduler = harness.scheduler(store.clone(), t0(), EngineConfig::default());

    scheduler
        .run_until(tokio::time::sleep(Duration::from_secs(60)))
        .await;

    assert_eq!(store.get().unwrap(), t0() + chrono::Duration::days(3));
    assert!(harness.observer.summaries.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_two_schedulers_run_a_due_week_once() {
    let harness = Harness::new();
    harness.pool.add(student(1), t0() - chrono::Duration::days(1));
    harness.pool.add(student(2), t0() - chrono::Duration::days(1));

    let store = Arc::new(RendezvousStore {
        inner: MemoryNextRunStore::new(t0()),
        barrier: Barrier::new(2),
        gets: AtomicUsize::new(0),
    });
    let now = t0() + chrono::Duration::seconds(1);
    let mut first = harness.scheduler(store.clone(), now, EngineConfig::default());
    let mut second = harness.scheduler(store.clone(), now, EngineConfig::default());

    tokio::join!(
        first.run_until(tokio::time::sleep(Duration::from_secs(3600))),
        second.run_until(tokio::time::sleep(Duration::from_secs(3600))),
    );

    // Only one of them ran the week due at t0; the other went back to waiting
    let summaries = harness.observer.summaries.lock().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].run_at, t0());
    assert_eq!(harness.dispatcher.matches.lock().unwrap().len(), 1);
    assert_eq!(store.get().unwrap(), t0() + chrono::Duration::days(7));
    assert!(harness.observer.alerts.lock().unwrap().is_empty());
}
