//! Stable exit codes for the task entrypoint.
//!
//! A child that exits normally has its own exit code propagated unchanged;
//! the constants below cover everything the coordinator decides itself.

/// The script ran and exited 0.
pub const OK: i32 = 0;
/// Configuration, download, spawn, log file or other failure, and child
/// processes terminated by a signal.
pub const FAILURE: i32 = 1;
/// The output channel between coordinator and child could not be created.
pub const PIPE_FAILED: i32 = 2;
/// The main module directory exists but could not be entered.
pub const CHDIR_FAILED: i32 = 127;
