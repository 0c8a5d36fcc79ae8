//! Sequence data source and the ledger that undoes pipeline-driven edits to it.

/// Restorable mutation ledger.
pub mod ledger;
/// Sequences, tracks and the owning library.
pub mod model;
