//! Process-wide lock over a space's feed directory.
//!
//! Concurrent writers to the same local feed from multiple processes are
//! not supported: single-writer-per-key is a hard assumption. When a
//! space's feeds live on a shared filesystem, this lock enforces it.
//! Failure to acquire is startup-fatal for the space, not a runtime error.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{FeedError, Result};

const LOCK_FILE: &str = "spacefold.lock";

/// An exclusive filesystem lock on a feed directory.
///
/// Released on drop. The lock file records the holding pid for operator
/// diagnosis; a stale file left by a crashed process must be removed by
/// the operator before the space can start.
#[derive(Debug)]
pub struct ProcessLock {
    path: PathBuf,
}

impl ProcessLock {
    /// Acquire the lock for a feed directory, creating it if needed.
    pub fn acquire(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let path = dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(FeedError::Locked(path))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The lock file's path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
