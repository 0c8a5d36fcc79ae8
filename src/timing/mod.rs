//! Frame-constant timing math shared by the shot builder and the scheduler.

/// Deterministic per-sample jitter.
pub mod jitter;
/// Tick-duration constants derived from rate, shutter and sample count.
pub mod metrics;
