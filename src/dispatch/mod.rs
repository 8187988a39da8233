//! Notifying participants about the outcome of a run.
//!
//! - [`OutcomeDispatcher`]: boundary trait, one call per matched pair and one per
//!   participant left over
//! - [`dispatch_outcome`]: concurrent fan-out with per-recipient failure isolation
//! - [`LogDispatcher`], [`OutboxDispatcher`]: reference implementations
//! - [`Observer`], [`RunSummary`]: operator-facing alerts and the per-run summary

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::core::types::ParticipantId;
use crate::matching::outcome::{MatchOutcome, Pair};

pub mod report;
pub mod sinks;

pub use report::{Observer, RunSummary, TracingObserver};
pub use sinks::{LogDispatcher, OutboxDispatcher};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Delivery to {recipient} failed: {reason}")]
    Delivery {
        recipient: ParticipantId,
        reason: String,
    },

    #[error("Failed to write notification: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize notification: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Delivers run results to participants
///
/// Calls for different recipients may run concurrently. Idempotent delivery is the
/// implementation's concern.
pub trait OutcomeDispatcher: Send + Sync {
    /// Tell both sides of a pair who they are meeting
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be delivered.
    fn notify_match(&self, a: ParticipantId, b: ParticipantId) -> Result<(), DispatchError>;

    /// Tell a participant nobody suitable was found and when the next run is
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be delivered.
    fn notify_unmatched(
        &self,
        participant: ParticipantId,
        next_run: DateTime<Utc>,
    ) -> Result<(), DispatchError>;
}

/// Who a single notification was for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Recipient {
    Pair { a: ParticipantId, b: ParticipantId },
    Unmatched { participant: ParticipantId },
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pair { a, b } => write!(f, "pair {a}/{b}"),
            Self::Unmatched { participant } => write!(f, "participant {participant}"),
        }
    }
}

/// One failed notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    pub recipient: Recipient,
    pub error: String,
}

/// Delivery counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub pairs_notified: usize,
    pub unmatched_notified: usize,
    pub failures: Vec<DispatchFailure>,
}

impl DispatchSummary {
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Send every notification for `outcome` concurrently.
///
/// Each call runs as its own blocking task. A failing or panicking call is recorded
/// in the summary and never affects the other recipients.
pub async fn dispatch_outcome(
    dispatcher: Arc<dyn OutcomeDispatcher>,
    outcome: &MatchOutcome,
    next_run: DateTime<Utc>,
) -> DispatchSummary {
    let mut tasks: JoinSet<(Recipient, Result<(), DispatchError>)> = JoinSet::new();

    for &Pair { low, high, .. } in &outcome.pairs {
        let dispatcher = Arc::clone(&dispatcher);
        tasks.spawn_blocking(move || {
            let recipient = Recipient::Pair { a: low, b: high };
            (recipient, guarded(low, || dispatcher.notify_match(low, high)))
        });
    }
    for &participant in &outcome.free {
        let dispatcher = Arc::clone(&dispatcher);
        tasks.spawn_blocking(move || {
            let recipient = Recipient::Unmatched { participant };
            let result = guarded(participant, || {
                dispatcher.notify_unmatched(participant, next_run)
            });
            (recipient, result)
        });
    }

    let mut summary = DispatchSummary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((recipient, Ok(()))) => {
                debug!(%recipient, "Notification delivered");
                match recipient {
                    Recipient::Pair { .. } => summary.pairs_notified += 1,
                    Recipient::Unmatched { .. } => summary.unmatched_notified += 1,
                }
            }
            Ok((recipient, Err(err))) => {
                warn!(%recipient, error = %err, "Notification failed");
                summary.failures.push(DispatchFailure {
                    recipient,
                    error: err.to_string(),
                });
            }
            // Only reachable if the runtime is shutting down
            Err(err) => warn!(error = %err, "Notification task did not complete"),
        }
    }

    summary.failures.sort_by_key(|f| match f.recipient {
        Recipient::Pair { a, .. } => (0, a),
        Recipient::Unmatched { participant } => (1, participant),
    });
    summary
}

/// Turn a panic inside a dispatcher call into a delivery error
fn guarded<F>(recipient: ParticipantId, call: F) -> Result<(), DispatchError>
where
    F: FnOnce() -> Result<(), DispatchError>,
{
    catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|panic| {
        let reason = panic
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "dispatcher panicked".to_string());
        Err(DispatchError::Delivery { recipient, reason })
    })
}
