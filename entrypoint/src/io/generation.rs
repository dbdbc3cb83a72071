//! Generation directory access: creation, listing and rerun indexing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::core::rerun::{IndexOverflow, RerunDecision, StageHighest};
use crate::core::stage::Stage;
use crate::errors::{EntrypointError, Result};

/// Index to use when the task is not a pipeline stage.
pub const INVALID_STAGE_SENTINEL: u64 = Stage::COUNT as u64;
/// Index to use when the generation directory cannot be listed.
pub const UNREADABLE_DIR_SENTINEL: u64 = 20;

#[derive(Error, Debug)]
pub enum RerunError {
    #[error("task '{0}' is not a pipeline stage")]
    InvalidStage(String),

    #[error("cannot list generation directory {}: {source}", path.display())]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    IndexOverflow(#[from] IndexOverflow),
}

impl RerunError {
    /// Fallback index recorded when indexing is impossible. An exhausted
    /// index range has none: any fallback could collide with a recorded run.
    pub fn sentinel(&self) -> Option<u64> {
        match self {
            RerunError::InvalidStage(_) => Some(INVALID_STAGE_SENTINEL),
            RerunError::DirectoryUnreadable { .. } => Some(UNREADABLE_DIR_SENTINEL),
            RerunError::IndexOverflow(_) => None,
        }
    }
}

/// Create the generation directory (and parents) if missing.
pub fn ensure_generation_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| EntrypointError::GenerationDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Names of every non-directory entry in `dir`. Names that are not valid
/// UTF-8 cannot match a stage and are skipped.
pub fn list_files(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    Ok(names)
}

/// Rerun index for `task` derived from the current contents of `dir`.
pub fn next_rerun_index(dir: &Path, task: &str) -> std::result::Result<u64, RerunError> {
    let stage: Stage = task
        .parse()
        .map_err(|_| RerunError::InvalidStage(task.to_string()))?;
    let names = list_files(dir).map_err(|source| RerunError::DirectoryUnreadable {
        path: dir.to_path_buf(),
        source,
    })?;

    let decision = RerunDecision::decide(&StageHighest::from_names(&names)?, stage)?;
    debug!(
        stage = %stage,
        files = names.len(),
        before = ?decision.before,
        own = ?decision.own,
        after = ?decision.after,
        index = decision.index,
        "rerun index derived"
    );
    Ok(decision.index)
}
