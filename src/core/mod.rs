//! Core data types for pairing participants.
//!
//! - [`Participant`]: one waiting participant as seen by a single run
//! - [`ParticipantId`], [`Role`], [`MeetingFormat`]: identity and hard-rule attributes
//! - [`Interest`], [`Place`]: closed tag sets used for scoring and location checks
//!
//! ## Meeting formats
//!
//! | Format  | Uses preferred places | Compatible with        |
//! |---------|-----------------------|------------------------|
//! | Online  | no                    | Online, Any            |
//! | Offline | yes                   | Offline, Any           |
//! | Any     | yes (unless both Any) | Online, Offline, Any   |

pub mod participant;
pub mod types;

pub use participant::Participant;
pub use types::{Interest, MeetingFormat, ParticipantId, Place, Role};
