//! Deterministic, pure logic shared by the rolling perf harness.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod artifacts;
pub mod phase;
pub mod template;
pub mod timestamp;
pub mod types;
