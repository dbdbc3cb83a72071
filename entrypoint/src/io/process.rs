//! Child process execution with combined output relayed live and recorded.
//!
//! The child's stdout and stderr share a single pipe, so the recorded log
//! preserves the exact interleaving the child produced. Every chunk read from
//! the pipe is written to the console and then to the log file, in order.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::{debug, info, instrument, warn};

use crate::errors::{EntrypointError, Result};
use crate::exit_codes;

const CHUNK_SIZE: usize = 8192;

/// Parameters for running the task script.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Interpreter the script is handed to.
    pub shell: PathBuf,
    /// Materialised task script.
    pub script: PathBuf,
    /// Durable record of the combined output.
    pub log_path: PathBuf,
}

/// How the child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    Signaled(i32),
}

impl ExitOutcome {
    fn from_status(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => ExitOutcome::Exited(code),
            (None, Some(signal)) => ExitOutcome::Signaled(signal),
            (None, None) => ExitOutcome::Exited(exit_codes::FAILURE),
        }
    }

    /// Exit status the coordinator reports. Signals are not propagated.
    pub fn exit_code(&self) -> i32 {
        match *self {
            ExitOutcome::Exited(code) => code,
            ExitOutcome::Signaled(_) => exit_codes::FAILURE,
        }
    }
}

/// Result of a completed child run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    pub exit: ExitOutcome,
    /// Bytes recorded in the log file.
    pub recorded_bytes: u64,
}

/// Enter `path` if it is an existing directory.
///
/// Returns `false` without changing anything when `path` is missing or not a
/// directory. Failing to enter an existing directory is fatal.
pub fn enter_main_module(path: &Path) -> Result<bool> {
    if !path.is_dir() {
        debug!(path = %path.display(), "main module is not a directory, staying put");
        return Ok(false);
    }
    std::env::set_current_dir(path).map_err(|source| EntrypointError::WorkingDirectory {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "entered main module");
    Ok(true)
}

/// Run `request.script` under `request.shell`, relaying output to `console`
/// and recording it to `request.log_path`, then reap the child.
#[instrument(skip_all, fields(script = %request.script.display()))]
pub fn run_script<W: Write>(request: &ExecRequest, console: &mut W) -> Result<ExecOutcome> {
    let (reader, writer) = io::pipe().map_err(EntrypointError::Pipe)?;
    let stderr_writer = writer.try_clone().map_err(EntrypointError::Pipe)?;

    // The command owns the parent's copies of the write end; dropping it at
    // the end of this block leaves the child as the only writer.
    let mut child = {
        let mut cmd = Command::new(&request.shell);
        cmd.arg(&request.script)
            .stdout(Stdio::from(writer))
            .stderr(Stdio::from(stderr_writer));
        cmd.spawn().map_err(|source| EntrypointError::Spawn {
            shell: request.shell.clone(),
            script: request.script.clone(),
            source,
        })?
    };
    debug!(pid = child.id(), "child spawned");

    let log_file = match open_log(&request.log_path) {
        Ok(file) => file,
        Err(source) => {
            abandon(&mut child);
            return Err(EntrypointError::LogFile {
                path: request.log_path.clone(),
                source,
            });
        }
    };
    info!(path = %request.log_path.display(), "logging to file");
    info!("streaming results from execution");

    let mut log = BufWriter::new(log_file);
    let recorded_bytes = match tee(reader, console, &mut log) {
        Ok(n) => n,
        Err(err) => {
            abandon(&mut child);
            return Err(EntrypointError::Stream(err));
        }
    };

    let status = child.wait().map_err(EntrypointError::Wait)?;
    let exit = ExitOutcome::from_status(status);
    match exit {
        ExitOutcome::Exited(code) => {
            info!(exit_code = code, recorded_bytes, "task process exited");
        }
        ExitOutcome::Signaled(signal) => {
            warn!(signal, recorded_bytes, "the process ended with kill -{signal}");
        }
    }
    Ok(ExecOutcome {
        exit,
        recorded_bytes,
    })
}

fn open_log(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

fn abandon(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(err = %err, "child already gone");
    }
    if let Err(err) = child.wait() {
        warn!(err = %err, "failed to reap child");
    }
}

/// Copy `reader` to end-of-stream into both sinks, chunk by chunk.
///
/// The console is a best-effort live view: once writing to it fails it is
/// skipped for the rest of the stream. Failures writing the log are returned.
pub fn tee<R: Read, C: Write, L: Write>(
    mut reader: R,
    console: &mut C,
    log: &mut L,
) -> io::Result<u64> {
    let mut chunk = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    let mut relay = true;

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        let bytes = &chunk[..n];

        if relay && let Err(err) = console.write_all(bytes).and_then(|()| console.flush()) {
            warn!(err = %err, "console relay failed, continuing with log file only");
            relay = false;
        }
        log.write_all(bytes)?;
        total += n as u64;
    }

    log.flush()?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_support::GenerationDir;

    const SHELL: &str = "/bin/sh";

    fn request(generation: &GenerationDir, script: &str) -> ExecRequest {
        let script_path = generation
            .write("apply.sh", script.as_bytes())
            .expect("write script");
        ExecRequest {
            shell: PathBuf::from(SHELL),
            script: script_path,
            log_path: generation.path().join("apply.0.log.out"),
        }
    }

    /// Writer that fails every write.
    struct ClosedConsole;

    impl Write for ClosedConsole {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn combined_output_is_recorded_in_order() {
        let generation = GenerationDir::new().expect("generation dir");
        let req = request(
            &generation,
            "echo one\necho two >&2\necho three\nprintf 'x\\001\\377' >&2\n",
        );
        let mut console: Vec<u8> = Vec::new();

        let outcome = run_script(&req, &mut console).expect("run");

        let logged = fs::read(&req.log_path).expect("read log");
        let expected: &[u8] = b"one\ntwo\nthree\nx\x01\xff";
        assert_eq!(logged, expected);
        assert_eq!(console, logged);
        assert_eq!(outcome.recorded_bytes, expected.len() as u64);
        assert_eq!(outcome.exit, ExitOutcome::Exited(0));
    }

    #[test]
    fn large_output_is_copied_byte_for_byte() {
        let generation = GenerationDir::new().expect("generation dir");
        let req = request(
            &generation,
            "i=0\nwhile [ $i -lt 2000 ]; do echo \"line $i of the task output\"; i=$((i+1)); done\n",
        );
        let mut console: Vec<u8> = Vec::new();

        let outcome = run_script(&req, &mut console).expect("run");

        let logged = fs::read(&req.log_path).expect("read log");
        assert_eq!(console, logged);
        assert_eq!(outcome.recorded_bytes, logged.len() as u64);
        let text = String::from_utf8(logged).expect("utf8");
        assert_eq!(text.lines().count(), 2000);
        assert_eq!(text.lines().last(), Some("line 1999 of the task output"));
    }

    #[test]
    fn child_exit_code_is_propagated() {
        let generation = GenerationDir::new().expect("generation dir");
        let req = request(&generation, "echo failing\nexit 7\n");

        let outcome = run_script(&req, &mut std::io::sink()).expect("run");

        assert_eq!(outcome.exit, ExitOutcome::Exited(7));
        assert_eq!(outcome.exit.exit_code(), 7);
    }

    #[test]
    fn signal_termination_reports_generic_failure() {
        let generation = GenerationDir::new().expect("generation dir");
        let req = request(&generation, "echo before\nkill -TERM $$\necho after\n");

        let outcome = run_script(&req, &mut std::io::sink()).expect("run");

        assert_eq!(outcome.exit, ExitOutcome::Signaled(15));
        assert_eq!(outcome.exit.exit_code(), exit_codes::FAILURE);
        assert_eq!(fs::read(&req.log_path).expect("read log"), b"before\n");
    }

    #[test]
    fn missing_interpreter_is_a_spawn_error() {
        let generation = GenerationDir::new().expect("generation dir");
        let mut req = request(&generation, "echo hi\n");
        req.shell = generation.path().join("no-such-shell");

        let err = run_script(&req, &mut std::io::sink()).expect_err("spawn");
        assert!(matches!(err, EntrypointError::Spawn { .. }));
        assert_eq!(err.exit_code(), exit_codes::FAILURE);
    }

    #[test]
    fn unopenable_log_file_is_fatal() {
        let generation = GenerationDir::new().expect("generation dir");
        let mut req = request(&generation, "echo hi\n");
        req.log_path = generation.path().join("missing-dir/apply.0.x.out");

        let err = run_script(&req, &mut std::io::sink()).expect_err("log file");
        assert!(matches!(err, EntrypointError::LogFile { .. }));
    }

    #[test]
    fn closed_console_still_records_everything() {
        let generation = GenerationDir::new().expect("generation dir");
        let req = request(&generation, "echo kept\necho also kept >&2\nexit 3\n");

        let outcome = run_script(&req, &mut ClosedConsole).expect("run");

        assert_eq!(
            fs::read(&req.log_path).expect("read log"),
            b"kept\nalso kept\n"
        );
        assert_eq!(outcome.exit.exit_code(), 3);
    }

    #[test]
    fn tee_preserves_chunk_boundaries_across_sinks() {
        let input: Vec<u8> = (0..=255u8).cycle().take(CHUNK_SIZE * 3 + 17).collect();
        let mut console: Vec<u8> = Vec::new();
        let mut log: Vec<u8> = Vec::new();

        let total = tee(input.as_slice(), &mut console, &mut log).expect("tee");

        assert_eq!(total, input.len() as u64);
        assert_eq!(console, input);
        assert_eq!(log, input);
    }

    #[test]
    fn missing_main_module_is_skipped() {
        let generation = GenerationDir::new().expect("generation dir");
        let file = generation.touch("not-a-dir").expect("touch");

        assert!(!enter_main_module(&generation.path().join("absent")).expect("absent"));
        assert!(!enter_main_module(&file).expect("file"));
    }
}
