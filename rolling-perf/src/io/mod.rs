//! I/O helpers for the harness: source control, subprocesses, persisted state
//! and the external build/test/upload collaborators.

pub mod atomic;
pub mod build;
pub mod config;
pub mod git;
pub mod history;
pub mod paths;
pub mod perf;
pub mod process;
pub mod publish;
pub mod tools;
pub mod upload;
