//! Rolling performance harness.
//!
//! Each invocation syncs a watched branch, walks back from its tip looking for
//! the most recent commit that has no history record, and pushes exactly one
//! such commit through build, perf tests, result publication and optional
//! upload. Success is recorded in a JSON history store so the commit is never
//! submitted again.
//!
//! - **[`core`]**: Pure logic (commit ids, records, timestamps, artifact
//!   naming, command templates, run phases). No I/O.
//! - **[`io`]**: Side effects (git, subprocesses, config, history store,
//!   publication, external collaborators).
//!
//! Orchestration lives at the crate root: [`walker`] moves through history,
//! [`submit`] drives one commit through the pipeline, and [`run`] ties an
//! invocation together.

pub mod context;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod run;
pub mod submit;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod walker;
