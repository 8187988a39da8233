//! Pair compatibility and the maximum-weight matching engine.
//!
//! - [`CompatibilityModel`]: hard exclusion rules and the interest-overlap weight
//! - [`CompatibilityGraph`]: allowed edges between the participants of one run
//! - [`MatchingEngine`]: picks disjoint pairs with the largest total weight
//! - [`MatchOutcome`]: the chosen pairs plus everyone left over
//!
//! ## Rules
//!
//! A pair is excluded, in this order, when the two have already met, have different
//! roles, share a group or a workplace, want strictly online vs strictly offline
//! meetings, or both may meet offline but have no preferred place in common (two
//! participants accepting any format are always location compatible). Otherwise the
//! pair weighs `shared interests + weight_floor`.
//!
//! ## Algorithm
//!
//! The graph is general (not bipartite), so the engine runs Edmonds' blossom
//! algorithm with primal-dual updates in integer arithmetic. Ties are broken by
//! participant id, which makes results reproducible for identical input.
//!
//! ## Example
//!
//! ```rust
//! use pair_solver::{EngineConfig, Interest, MatchingEngine, Participant, Role};
//!
//! let engine = MatchingEngine::new(EngineConfig::default()).unwrap();
//! let outcome = engine
//!     .solve(vec![
//!         Participant::new(1, Role::Worker).with_interests([Interest::Books]),
//!         Participant::new(2, Role::Worker).with_interests([Interest::Books]),
//!         Participant::new(3, Role::Student),
//!     ])
//!     .unwrap();
//!
//! assert_eq!(outcome.pairs.len(), 1);
//! assert_eq!(outcome.free.len(), 1);
//! ```

pub mod blossom;
pub mod compatibility;
pub mod engine;
pub mod graph;
pub mod outcome;

pub use compatibility::{Compatibility, CompatibilityModel, Exclusion};
pub use engine::{CancelFlag, EngineConfig, EngineError, MatchingEngine};
pub use graph::CompatibilityGraph;
pub use outcome::{MatchOutcome, Pair, RoleCounts};
