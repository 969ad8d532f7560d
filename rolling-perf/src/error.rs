//! Error classification for the run controller.
//!
//! Everything is carried as `anyhow::Error`. Recognized configuration and
//! environment problems are wrapped in [`FatalError`] so the binary can map
//! them to [`crate::exit_codes::FATAL`]; everything else is unhandled.

use std::fmt;

use crate::exit_codes;

/// A recognized configuration/environment error. Not retried by the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalError {
    pub message: String,
}

impl FatalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for FatalError {}

/// Shorthand for `Err(FatalError::new(..).into())`.
pub fn fatal<T>(message: impl Into<String>) -> anyhow::Result<T> {
    Err(FatalError::new(message).into())
}

/// True if `err` (or any error in its chain) is a [`FatalError`].
pub fn is_fatal(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<FatalError>())
}

/// Exit code for a failed invocation.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if is_fatal(err) {
        exit_codes::FATAL
    } else {
        exit_codes::INTERNAL
    }
}
