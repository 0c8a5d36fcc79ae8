//! Setting records, the registry that gives each kind its defaults and checks, and per-shot
//! resolution.

/// Tagged setting records.
pub mod records;
/// Explicit kind-to-descriptor registry.
pub mod registry;
/// Shot override / pipeline config / default resolution.
pub mod resolve;
