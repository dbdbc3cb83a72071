//! Typed failures of a task invocation and their exit codes.
//!
//! Every failure is fatal to the invocation. Errors bubble up to `main`, which
//! is the only place that turns them into a process exit status.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::exit_codes;
use crate::io::generation::RerunError;

#[derive(Error, Debug)]
pub enum EntrypointError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("account bootstrap failed: {0:#}")]
    Account(#[source] anyhow::Error),

    #[error("create generation directory {}: {source}", path.display())]
    GenerationDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("derive rerun index: {0}")]
    RerunIndex(#[source] RerunError),

    #[error("copy script {} to {}: {source}", origin.display(), dest.display())]
    ScriptCopy {
        origin: PathBuf,
        dest: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("download {url} to {}: {reason}", path.display())]
    Download {
        url: String,
        path: PathBuf,
        reason: String,
    },

    #[error("cannot change directory into {}: {source}", path.display())]
    WorkingDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("opening pipe failed: {0}")]
    Pipe(#[source] io::Error),

    #[error("spawn {} {}: {source}", shell.display(), script.display())]
    Spawn {
        shell: PathBuf,
        script: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("open log file {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("stream child output: {0}")]
    Stream(#[source] io::Error),

    #[error("wait for child process: {0}")]
    Wait(#[source] io::Error),
}

impl EntrypointError {
    /// Process exit status reported for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            EntrypointError::WorkingDirectory { .. } => exit_codes::CHDIR_FAILED,
            EntrypointError::Pipe(_) => exit_codes::PIPE_FAILED,
            _ => exit_codes::FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, EntrypointError>;
