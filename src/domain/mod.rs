//! Domain layer types and invariants.

pub mod design;
pub mod error;
pub mod jobs;
