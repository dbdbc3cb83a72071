//! I/O helpers for the task entrypoint.

pub mod account;
pub mod config;
pub mod generation;
pub mod process;
pub mod script;
