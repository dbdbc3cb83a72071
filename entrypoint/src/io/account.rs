//! Passwd bootstrap for containers running under an arbitrary uid.
//!
//! Some tools refuse to run when the current uid has no passwd entry. When
//! the entry is missing and the passwd file is writable, one is appended.
//!
//! A uid counts as known when either the configured passwd file or the
//! system `/etc/passwd` lists it. Other name service sources (LDAP, sssd)
//! are not consulted.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, info};

use crate::errors::{EntrypointError, Result};
use crate::io::config::AccountConfig;

const SYSTEM_PASSWD: &str = "/etc/passwd";

/// What the bootstrap did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountOutcome {
    /// The uid already resolves to an entry.
    Existing,
    /// An entry was appended to the passwd file.
    Created,
    /// No entry exists and the passwd file cannot be written.
    Skipped,
}

/// Process uid and gid, read from the ownership of `/proc/self`.
pub fn current_ids() -> anyhow::Result<(u32, u32)> {
    let meta = fs::metadata("/proc/self").context("stat /proc/self")?;
    Ok((meta.uid(), meta.gid()))
}

/// Ensure the current process uid has a passwd entry.
pub fn ensure_account(cfg: &AccountConfig) -> Result<AccountOutcome> {
    let (uid, gid) = current_ids().map_err(EntrypointError::Account)?;
    ensure_account_for(cfg, uid, gid)
}

/// Ensure `uid` has a passwd entry, appending one for `uid:gid` to
/// `cfg.passwd` when no known file lists it and `cfg.passwd` is writable.
pub fn ensure_account_for(cfg: &AccountConfig, uid: u32, gid: u32) -> Result<AccountOutcome> {
    if uid_known(&cfg.passwd, uid) {
        debug!(uid, "user entry exists");
        return Ok(AccountOutcome::Existing);
    }

    let mut passwd = match OpenOptions::new().append(true).open(&cfg.passwd) {
        Ok(file) => file,
        Err(err) => {
            debug!(path = %cfg.passwd.display(), err = %err, "passwd not writable, skipping user bootstrap");
            return Ok(AccountOutcome::Skipped);
        }
    };

    let home = cfg
        .home
        .as_ref()
        .ok_or_else(|| EntrypointError::Config("'HOME' env is required".to_string()))?;

    let entry = passwd_entry(&cfg.user_name, uid, gid, home);
    passwd
        .write_all(entry.as_bytes())
        .with_context(|| format!("append to {}", cfg.passwd.display()))
        .map_err(EntrypointError::Account)?;

    info!(user = %cfg.user_name, uid, gid, "added user entry");
    Ok(AccountOutcome::Created)
}

/// `<user>:x:<uid>:<gid>:<user> user:<home>:/sbin/nologin`
fn passwd_entry(user: &str, uid: u32, gid: u32, home: &Path) -> String {
    format!(
        "{user}:x:{uid}:{gid}:{user} user:{}:/sbin/nologin\n",
        home.display()
    )
}

fn uid_known(passwd: &Path, uid: u32) -> bool {
    let system = Path::new(SYSTEM_PASSWD);
    uid_has_entry(passwd, uid) || (passwd != system && uid_has_entry(system, uid))
}

/// Whether any line of the passwd file carries `uid` in its third field. An
/// unreadable file resolves nothing.
fn uid_has_entry(passwd: &Path, uid: u32) -> bool {
    let contents = match fs::read_to_string(passwd) {
        Ok(contents) => contents,
        Err(err) => {
            debug!(path = %passwd.display(), err = %err, "cannot read passwd");
            return false;
        }
    };
    contents
        .lines()
        .filter_map(|line| line.split(':').nth(2))
        .any(|field| field.parse::<u32>() == Ok(uid))
}
