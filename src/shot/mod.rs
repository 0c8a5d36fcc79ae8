//! Shot plan: the data model and the builder that derives it from a sequence.

/// Builds the ordered, handle-expanded shot plan.
pub mod builder;
/// Shots, camera cuts and their per-cut state machine.
pub mod model;
