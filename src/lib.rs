//! # pair-solver
//!
//! A library for pairing waiting participants into one-on-one meetings.
//!
//! People join a waiting pool during the week. Once per period the pool is drained:
//! everyone who joined before the run time is paired with at most one partner, and
//! the set of pairs is chosen to maximize the total number of shared interests. Pairs
//! that must never happen (people who already met, different roles, same group or
//! workplace, no common meeting format or place) are excluded outright.
//!
//! ## Features
//!
//! - **Optimal matching**: Edmonds' blossom algorithm for maximum-weight matching
//!   on general graphs, not a greedy approximation
//! - **Explainable exclusions**: Every rejected pair carries the rule that rejected it
//! - **Time budget**: A solve that runs out of time returns a valid best-effort result
//! - **Weekly scheduler**: Persisted next-run time, notification fan-out, and alerts
//!
//! ## Example
//!
//! ```rust
//! use pair_solver::{EngineConfig, Interest, MatchingEngine, Participant, Role};
//!
//! let pool = vec![
//!     Participant::new(1, Role::Student).with_interests([Interest::Music, Interest::Sport]),
//!     Participant::new(2, Role::Student).with_interests([Interest::Music]),
//!     Participant::new(3, Role::Worker),
//! ];
//!
//! let engine = MatchingEngine::new(EngineConfig::default()).unwrap();
//! let outcome = engine.solve(pool).unwrap();
//!
//! assert_eq!(outcome.pairs.len(), 1);
//! assert_eq!(outcome.free.len(), 1);
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Participants and their attributes
//! - [`matching`]: Compatibility rules, graph construction and the matching engine
//! - [`pool`]: Waiting pool sources and snapshot validation
//! - [`schedule`]: Next-run persistence and the periodic run loop
//! - [`dispatch`]: Notification fan-out and run reporting
//! - [`cli`]: Command-line interface implementation

pub mod cli;
pub mod core;
pub mod dispatch;
pub mod matching;
pub mod pool;
pub mod schedule;
pub mod utils;

// Re-export commonly used types for convenience
pub use core::participant::Participant;
pub use core::types::*;
pub use matching::compatibility::{Compatibility, CompatibilityModel, Exclusion};
pub use matching::engine::{CancelFlag, EngineConfig, EngineError, MatchingEngine};
pub use matching::outcome::{MatchOutcome, Pair};
pub use pool::ParticipantSource;
pub use schedule::scheduler::RunScheduler;
