//! Shared helpers.

pub mod lock;
pub mod validation;
