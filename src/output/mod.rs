//! Hand-off to the renderer and output writers: sample descriptors, the collaborator traits, the
//! frame completion accumulator, and reference implementations.

/// Output frame completion contract.
pub mod accumulator;
/// Collaborator traits and the records that cross them.
pub mod contract;
/// In-memory output container and recording time driver.
pub mod memory;
/// Threaded reference render sink.
pub mod simulated;
