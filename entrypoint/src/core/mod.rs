//! Deterministic, pure logic shared by the entrypoint.
//!
//! Core modules must be free of I/O side effects. They operate on stage names
//! and in-memory directory listings and return deterministic outputs suitable
//! for tests.

pub mod log_name;
pub mod rerun;
pub mod stage;
