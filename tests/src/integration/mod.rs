//! Cross-crate integration scenarios.

pub mod fixtures;

mod bridge;
mod termination;
