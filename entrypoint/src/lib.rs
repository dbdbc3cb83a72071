//! Per-invocation coordinator for one task of a generation pipeline.
//!
//! Each invocation runs a single pipeline stage inside its container: it
//! derives the stage's rerun index from the generation directory, materialises
//! the task script, runs it, and records its output. The architecture keeps a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (stage ordering, log filename
//!   parsing, rerun index decisions). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (environment, filesystem, HTTP,
//!   process execution).
//!
//! [`task`] coordinates core logic with I/O for one invocation; `main` maps its
//! result to the process exit status.

pub mod core;
pub mod errors;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
