//! Stable exit codes for ruletree CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Rule file or configuration is malformed (nothing was mapped).
pub const INVALID: i32 = 1;
/// Mapping failed: a predicate or transform errored, or I/O failed.
pub const FAILED: i32 = 2;
