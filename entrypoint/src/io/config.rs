//! Task configuration supplied through the container environment.
//!
//! Every option is read from its environment variable and may also be passed
//! as a long flag. Required values are checked in [`TaskConfig::from_args`]
//! so a missing one is reported by its variable name.

use std::path::PathBuf;

use clap::Parser;
use tracing::warn;

use crate::core::log_name::log_file_name;
use crate::errors::{EntrypointError, Result};

pub const DEFAULT_SHELL: &str = "/bin/bash";
pub const DEFAULT_PASSWD: &str = "/etc/passwd";
pub const DEFAULT_USER_NAME: &str = "tfo-runner";

/// Raw options as read from the environment.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "entrypoint",
    version,
    about = "Run one task of a generation and record its output"
)]
pub struct TaskArgs {
    /// Pipeline stage to run (e.g. `plan`).
    #[arg(long, env = "TFO_TASK")]
    pub task: Option<String>,

    /// Generation identifier, used for logging.
    #[arg(long, env = "TFO_GENERATION")]
    pub generation: Option<String>,

    /// Directory holding every task's output for this generation.
    #[arg(long, env = "TFO_GENERATION_PATH")]
    pub generation_path: Option<PathBuf>,

    /// Main module directory; becomes the working directory when it exists.
    #[arg(long, env = "TFO_MAIN_MODULE")]
    pub main_module: Option<PathBuf>,

    /// Directory containing `inline-<task>.sh` scripts.
    #[arg(long, env = "TFO_MAIN_MODULE_ADDONS")]
    pub main_module_addons: Option<PathBuf>,

    /// Mount path of the ConfigMap holding the task script.
    #[arg(long, env = "TFO_TASK_EXEC_CONFIGMAP_SOURCE_PATH")]
    pub configmap_source_path: Option<PathBuf>,

    /// Key within the ConfigMap mount holding the task script.
    #[arg(long, env = "TFO_TASK_EXEC_CONFIGMAP_SOURCE_KEY")]
    pub configmap_source_key: Option<String>,

    /// URL the task script is downloaded from when no local source exists.
    #[arg(long, env = "TFO_TASK_EXEC_URL_SOURCE")]
    pub url_source: Option<String>,

    /// Invocation identifier embedded in the output filename.
    #[arg(long, env = "POD_UID")]
    pub pod_uid: Option<String>,

    /// Interpreter the task script is run with.
    #[arg(long, env = "TFO_TASK_SHELL", default_value = DEFAULT_SHELL)]
    pub shell: PathBuf,

    /// Passwd file an account entry is appended to when the uid is unknown.
    #[arg(long, env = "PASSWD", default_value = DEFAULT_PASSWD)]
    pub passwd: PathBuf,

    /// Home directory written into a bootstrapped account entry.
    #[arg(long, env = "HOME")]
    pub home: Option<PathBuf>,

    /// User name written into a bootstrapped account entry.
    #[arg(long, env = "USER_NAME", default_value = DEFAULT_USER_NAME)]
    pub user_name: String,
}

/// A ConfigMap-mounted script file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigMapSource {
    pub mount_path: PathBuf,
    pub key: String,
}

impl ConfigMapSource {
    pub fn file_path(&self) -> PathBuf {
        self.mount_path.join(&self.key)
    }
}

/// Inputs for the passwd bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    pub passwd: PathBuf,
    pub home: Option<PathBuf>,
    pub user_name: String,
}

/// Validated task configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConfig {
    pub task: String,
    pub generation: String,
    pub generation_path: PathBuf,
    pub main_module: PathBuf,
    pub main_module_addons: Option<PathBuf>,
    pub configmap: Option<ConfigMapSource>,
    pub url_source: String,
    pub pod_uid: Option<String>,
    pub shell: PathBuf,
    pub account: AccountConfig,
}

impl TaskConfig {
    pub fn from_args(args: TaskArgs) -> Result<Self> {
        let configmap = match (args.configmap_source_path, args.configmap_source_key) {
            (Some(mount_path), Some(key)) => Some(ConfigMapSource { mount_path, key }),
            (None, None) => None,
            (path, key) => {
                warn!(
                    path = ?path,
                    key = ?key,
                    "ConfigMap source needs both path and key, ignoring it"
                );
                None
            }
        };

        Ok(Self {
            task: required(args.task, "TFO_TASK")?,
            generation: required(args.generation, "TFO_GENERATION")?,
            generation_path: required(args.generation_path, "TFO_GENERATION_PATH")?,
            main_module: required(args.main_module, "TFO_MAIN_MODULE")?,
            main_module_addons: args.main_module_addons,
            configmap,
            url_source: required(args.url_source, "TFO_TASK_EXEC_URL_SOURCE")?,
            pod_uid: args.pod_uid,
            shell: args.shell,
            account: AccountConfig {
                passwd: args.passwd,
                home: args.home,
                user_name: args.user_name,
            },
        })
    }

    /// Where the resolved script is materialised: `<generation>/<task>.sh`.
    pub fn exec_script_path(&self) -> PathBuf {
        self.generation_path.join(format!("{}.sh", self.task))
    }

    /// `<addons>/inline-<task>.sh`, when an addons directory is configured.
    pub fn inline_source(&self) -> Option<PathBuf> {
        self.main_module_addons
            .as_ref()
            .map(|addons| addons.join(format!("inline-{}.sh", self.task)))
    }

    pub fn configmap_source(&self) -> Option<PathBuf> {
        self.configmap.as_ref().map(ConfigMapSource::file_path)
    }

    /// Identifier embedded in this run's output filename. Falls back to a
    /// fresh random UUID so the filename keeps its recognised shape.
    pub fn invocation_id(&self) -> String {
        self.pod_uid
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    /// `<generation>/<task>.<rerun>.<invocation-id>.out`
    pub fn log_file_path(&self, rerun: u64, invocation_id: &str) -> PathBuf {
        self.generation_path.join(log_file_name(&self.task, rerun, invocation_id))
    }
}

fn required<T>(value: Option<T>, env: &str) -> Result<T> {
    value.ok_or_else(|| EntrypointError::Config(format!("'{env}' env is required")))
}
