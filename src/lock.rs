//! Per-environment advisory run lock.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::RunError;
use crate::ledger::check_environment;

/// Exclusive lock on `<lock_dir>/<environment>.lock`, held until dropped.
///
/// At most one run may hold the lock for an environment; runs against
/// different environments take different locks and never contend.
#[derive(Debug)]
pub struct EnvironmentLock {
    file: File,
    path: PathBuf,
}

impl EnvironmentLock {
    /// Take the lock without blocking.
    pub fn acquire(lock_dir: &Path, environment: &str) -> Result<Self, RunError> {
        check_environment(environment)?;
        std::fs::create_dir_all(lock_dir).map_err(|e| {
            RunError::Other(anyhow::anyhow!(
                "Failed to create lock directory {}: {}",
                lock_dir.display(),
                e
            ))
        })?;

        let path = lock_dir.join(format!("{}.lock", environment));
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                RunError::Other(anyhow::anyhow!(
                    "Failed to open lock file {}: {}",
                    path.display(),
                    e
                ))
            })?;

        if file.try_lock_exclusive().is_err() {
            return Err(RunError::EnvironmentLocked(environment.to_string()));
        }

        // Best effort: the holder's pid helps an operator find a stuck run.
        let _ = file.set_len(0);
        let _ = writeln!(file, "{}", std::process::id());

        tracing::debug!(environment, path = %path.display(), "Environment lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EnvironmentLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
