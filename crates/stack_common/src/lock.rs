//! Run locks
//!
//! One mutual-exclusion lock per orchestrator kind, held for the whole
//! run. External scheduling is expected to prevent overlapping runs;
//! the lock makes that an invariant instead of an assumption.
//!
//! The lock is an `O_EXCL`-created file carrying the holder's pid. A
//! lock whose holder is gone is stale and reclaimed with a warning.

use crate::error::{Result, StackError};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquire the lock for one orchestrator kind (`backup`, `restore`,
    /// `update`). Fails fast with `PreconditionFailed` when a live run
    /// of the same kind holds it.
    pub fn acquire(dir: &Path, kind: &str) -> Result<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| StackError::io(format!("creating {}", dir.display()), e))?;
        let path = dir.join(format!(".{}.lock", kind));

        match Self::try_create(&path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path).unwrap_or_default();
                let holder_pid: Option<u32> = holder.trim().parse().ok();

                if let Some(pid) = holder_pid {
                    if process_alive(pid) {
                        return Err(StackError::PreconditionFailed(format!(
                            "another {} run is in progress (pid {})",
                            kind, pid
                        )));
                    }
                }
                warn!(
                    "⚠️  Reclaiming stale {} lock (holder {} is gone)",
                    kind,
                    holder.trim()
                );
                fs::remove_file(&path)
                    .map_err(|e| StackError::io(format!("removing stale {} lock", kind), e))?;
                Self::try_create(&path)
                    .map_err(|e| StackError::io(format!("acquiring {} lock", kind), e))
            }
            Err(e) => Err(StackError::io(format!("acquiring {} lock", kind), e)),
        }
    }

    fn try_create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        write!(file, "{}", std::process::id())?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}
