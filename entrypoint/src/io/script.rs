//! Task script resolution.
//!
//! Exactly one source is used per invocation, in priority order:
//!
//! 1. the inline script shipped with the main module addons,
//! 2. the ConfigMap-mounted script,
//! 3. the remote URL, fetched once.
//!
//! A local source qualifies when it is a regular, non-empty file. The chosen
//! script is materialised at the destination path before anything executes.

use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use tracing::{debug, info, instrument, warn};

use crate::errors::{EntrypointError, Result};

const SCRIPT_MODE: u32 = 0o755;
const MAX_REDIRECTS: usize = 10;

/// Where the executed script came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptSource {
    Inline,
    ConfigMap,
    RemoteUrl,
}

/// Candidate locations for the task script.
#[derive(Debug, Clone)]
pub struct ScriptSources {
    pub inline: Option<PathBuf>,
    pub configmap: Option<PathBuf>,
    pub url: String,
}

/// Abstraction over remote script retrieval.
pub trait ScriptFetcher {
    /// Stream `url` into `dest`. On failure `dest` must not be left behind.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Fetcher performing a single HTTP(S) GET that follows redirects and treats
/// any non-success status as a failure.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Option<Client>,
}

impl HttpFetcher {
    pub fn with_client(client: Client) -> Self {
        Self {
            client: Some(client),
        }
    }

    fn client(&self) -> reqwest::Result<Client> {
        match &self.client {
            Some(client) => Ok(client.clone()),
            None => Client::builder()
                .redirect(Policy::limited(MAX_REDIRECTS))
                .timeout(None::<Duration>)
                .build(),
        }
    }

    fn download(&self, url: &str, dest: &Path) -> std::result::Result<u64, String> {
        let mut file = File::create(dest).map_err(|err| format!("open for write: {err}"))?;
        let client = self.client().map_err(describe)?;
        let mut response = client
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .map_err(describe)?;
        let written = response.copy_to(&mut file).map_err(describe)?;
        file.flush().map_err(|err| format!("flush: {err}"))?;
        Ok(written)
    }
}

impl ScriptFetcher for HttpFetcher {
    #[instrument(skip_all, fields(url = %url))]
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        info!("downloading task script");
        match self.download(url, dest) {
            Ok(written) => {
                info!(path = %dest.display(), bytes = written, "file saved");
                Ok(written)
            }
            Err(reason) => {
                warn!(reason = %reason, "download failed");
                if let Err(err) = fs::remove_file(dest) {
                    debug!(err = %err, "no partial download to remove");
                }
                Err(EntrypointError::Download {
                    url: url.to_string(),
                    path: dest.to_path_buf(),
                    reason,
                })
            }
        }
    }
}

/// Materialise the task script at `dest` from the first usable source.
pub fn resolve_script<F: ScriptFetcher>(
    sources: &ScriptSources,
    dest: &Path,
    fetcher: &F,
) -> Result<ScriptSource> {
    let local = [
        (ScriptSource::Inline, sources.inline.as_deref()),
        (ScriptSource::ConfigMap, sources.configmap.as_deref()),
    ];
    for (source, path) in local {
        let Some(path) = path else {
            continue;
        };
        if qualifies(path) {
            copy_script(path, dest)?;
            info!(source = ?source, path = %path.display(), "execution script copied");
            return Ok(source);
        }
        debug!(source = ?source, path = %path.display(), "script source not usable");
    }

    fetcher.fetch(&sources.url, dest)?;
    set_executable(dest).map_err(|source| EntrypointError::ScriptCopy {
        origin: PathBuf::from(&sources.url),
        dest: dest.to_path_buf(),
        source,
    })?;
    Ok(ScriptSource::RemoteUrl)
}

/// Regular, non-empty file (symlinks are followed).
fn qualifies(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

fn copy_script(origin: &Path, dest: &Path) -> Result<()> {
    fs::copy(origin, dest)
        .and_then(|_| set_executable(dest))
        .map_err(|source| EntrypointError::ScriptCopy {
            origin: origin.to_path_buf(),
            dest: dest.to_path_buf(),
            source,
        })
}

fn set_executable(path: &Path) -> std::io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(SCRIPT_MODE))
}

fn describe(err: reqwest::Error) -> String {
    format!("{:#}", anyhow::Error::new(err))
}
