//! Stable exit codes for the `rolling-perf` binary.

/// Invocation succeeded, including "nothing new to process".
pub const OK: i32 = 0;
/// A recognized configuration or environment problem (see [`crate::error::FatalError`]).
pub const FATAL: i32 = 1;
/// Any other, unanticipated error.
pub const INTERNAL: i32 = 2;
