//! Pipeline driver: lifecycle state machine, per-tick frame timing and events.

/// Observer notifications.
pub mod events;
/// The [`scheduler::Pipeline`] driver.
pub mod scheduler;
/// Lifecycle states and cached output state.
pub mod state;
/// Per-tick cursor math for one camera cut.
pub mod timing;
