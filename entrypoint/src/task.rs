//! Orchestration for a single task invocation.
//!
//! One invocation prepares the generation directory, derives the rerun index,
//! materialises the task script, enters the main module and runs the script
//! while recording its output. Any failure ends the invocation immediately.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::errors::{EntrypointError, Result};
use crate::io::config::TaskConfig;
use crate::io::generation::{ensure_generation_dir, next_rerun_index};
use crate::io::process::{ExecRequest, ExitOutcome, enter_main_module, run_script};
use crate::io::script::{ScriptFetcher, ScriptSource, ScriptSources, resolve_script};

/// Outcome of one task invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    /// Rerun index used in the log filename.
    pub rerun: u64,
    pub source: ScriptSource,
    pub script_path: PathBuf,
    pub log_path: PathBuf,
    pub exit: ExitOutcome,
}

impl TaskOutcome {
    pub fn exit_code(&self) -> i32 {
        self.exit.exit_code()
    }
}

/// Run the configured task, relaying its output to `console`.
pub fn run_task<F: ScriptFetcher, W: Write>(
    cfg: &TaskConfig,
    fetcher: &F,
    console: &mut W,
) -> Result<TaskOutcome> {
    // Resolved before the working directory may change.
    let generation_path = absolute(&cfg.generation_path)?;
    ensure_generation_dir(&generation_path)?;

    let rerun = match next_rerun_index(&generation_path, &cfg.task) {
        Ok(index) => index,
        Err(err) => match err.sentinel() {
            Some(sentinel) => {
                warn!(err = %err, sentinel, "cannot derive rerun index, using sentinel");
                sentinel
            }
            None => return Err(EntrypointError::RerunIndex(err)),
        },
    };
    info!("Generation #{} Run: #{rerun}", cfg.generation);

    let task_cfg = TaskConfig {
        generation_path,
        ..cfg.clone()
    };
    let script_path = task_cfg.exec_script_path();
    let sources = ScriptSources {
        inline: task_cfg.inline_source(),
        configmap: task_cfg.configmap_source(),
        url: task_cfg.url_source.clone(),
    };
    let source = resolve_script(&sources, &script_path, fetcher)?;
    info!(script = %script_path.display(), source = ?source, "executing");

    enter_main_module(&task_cfg.main_module)?;

    let log_path = task_cfg.log_file_path(rerun, &task_cfg.invocation_id());
    let outcome = run_script(
        &ExecRequest {
            shell: task_cfg.shell.clone(),
            script: script_path.clone(),
            log_path: log_path.clone(),
        },
        console,
    )?;

    Ok(TaskOutcome {
        rerun,
        source,
        script_path,
        log_path,
        exit: outcome.exit,
    })
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|source| EntrypointError::GenerationDir {
        path: path.to_path_buf(),
        source,
    })
}
