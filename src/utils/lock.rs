use crate::{debug, warn};
use anyhow::{bail, Context, Result};
use nix::{errno::Errno, sys::signal::kill, unistd::Pid};
use serde::{Deserialize, Serialize};
use std::{fs, io::prelude::*, path::Path};

/// Make sure only one daemon works on a cache directory at one time
const LOCK_FILE: &str = "architect.lock";

#[derive(Serialize, Deserialize)]
struct LockInfo {
    pid: i32,
}

/// PID of a live daemon holding the lock, if any
pub fn check(root: &Path) -> Result<Option<i32>> {
    let lock_path = root.join(LOCK_FILE);
    if !lock_path.is_file() {
        return Ok(None);
    }

    let lock_content = fs::read_to_string(&lock_path).context("Failed to read lock file")?;
    let lock_info: LockInfo = toml::from_str(&lock_content).context("Failed to parse lock file")?;
    match kill(Pid::from_raw(lock_info.pid), None) {
        Err(Errno::ESRCH) => {
            warn!("Ignoring stale lock left by PID {}", lock_info.pid);
            Ok(None)
        }
        _ => Ok(Some(lock_info.pid)),
    }
}

pub fn acquire(root: &Path) -> Result<()> {
    if let Some(pid) = check(root)? {
        bail!("Another architect daemon is currently running at PID {}", pid);
    }

    if !root.is_dir() {
        fs::create_dir_all(root).context("Failed to create dir for lock file")?;
    }
    let lock_info = LockInfo {
        pid: std::process::id() as i32,
    };
    let lock_content = toml::to_string(&lock_info)?;
    let mut file = fs::File::create(root.join(LOCK_FILE)).context("Failed to create lock file")?;
    file.write_all(lock_content.as_bytes())
        .context("Failed to write lock content")?;
    Ok(())
}

/// Acquire the lock and release it again on SIGINT/SIGTERM
pub fn lock(root: &Path) -> Result<()> {
    acquire(root)?;

    let root = root.to_owned();
    ctrlc::set_handler(move || {
        // Nothing to save, the graph is rebuilt from providers on start
        if let Err(e) = unlock(&root) {
            warn!("Failed to unlock: {}", e);
        }
        std::process::exit(2);
    })
    .context("Error setting SIGINT handler")?;
    Ok(())
}

pub fn unlock(root: &Path) -> Result<()> {
    let lock_path = root.join(LOCK_FILE);
    if lock_path.is_file() {
        fs::remove_file(&lock_path).context("Failed to delete lock file")?;
    } else {
        debug!("Attempt to unlock, but lock file doesn't exist");
    }
    Ok(())
}
