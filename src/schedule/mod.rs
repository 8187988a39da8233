//! The weekly run loop.
//!
//! [`RunScheduler`] owns the cycle: read the persisted next-run time, sleep until it
//! is due, move it one period forward (before the pool is read, so a crash mid-run
//! never repeats a run), match everyone who joined before the scheduled time, and
//! hand the outcome to the dispatcher.
//!
//! ```text
//!   Idle ──(next run due)──▶ Running ──(dispatch done or failed)──▶ Idle
//! ```
//!
//! A failing cycle never stops the loop. Persistence failures leave the state
//! untouched and are retried after a short back-off; other failures are alerted and
//! the loop waits for the next scheduled run.

pub mod clock;
pub mod scheduler;
pub mod state;

pub use clock::{Clock, FixedClock, SystemClock};
pub use scheduler::{
    default_period, Collaborators, CycleError, CycleReport, RunScheduler, SchedulerConfig,
    SchedulerState, DEFAULT_RETRY_BACKOFF,
};
pub use state::{FileNextRunStore, MemoryNextRunStore, NextRunStore, PersistenceError};
