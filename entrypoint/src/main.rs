//! Task entrypoint.
//!
//! Reads its configuration from the environment, runs the configured task and
//! exits with the task script's own exit status.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use tracing::{error, info};

use entrypoint::errors::{EntrypointError, Result};
use entrypoint::exit_codes;
use entrypoint::io::account::ensure_account;
use entrypoint::io::config::{TaskArgs, TaskConfig};
use entrypoint::io::script::HttpFetcher;
use entrypoint::logging;
use entrypoint::task::run_task;

fn main() -> ExitCode {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            err.exit_code()
        }
    };
    ExitCode::from(exit_status_byte(code))
}

fn run() -> Result<i32> {
    let args = match TaskArgs::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => return Err(EntrypointError::Config(err.to_string())),
    };
    let cfg = TaskConfig::from_args(args)?;

    ensure_account(&cfg.account)?;

    let stdout = io::stdout();
    let outcome = run_task(&cfg, &HttpFetcher::default(), &mut stdout.lock())?;
    info!(
        task = %cfg.task,
        rerun = outcome.rerun,
        exit_code = outcome.exit_code(),
        "task finished"
    );
    Ok(outcome.exit_code())
}

/// Exit statuses are a single byte; anything outside that range is reported
/// as a generic failure.
fn exit_status_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(exit_codes::FAILURE as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_pass_through_when_in_range() {
        assert_eq!(exit_status_byte(0), 0);
        assert_eq!(exit_status_byte(42), 42);
        assert_eq!(exit_status_byte(255), 255);
    }

    #[test]
    fn out_of_range_codes_become_failure() {
        assert_eq!(exit_status_byte(-1), 1);
        assert_eq!(exit_status_byte(256), 1);
    }
}
