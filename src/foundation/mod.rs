/// Tick, rate and range primitives.
pub mod core;
/// Error taxonomy.
pub mod error;
