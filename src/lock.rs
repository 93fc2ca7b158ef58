// src/lock.rs

//! Exclusive build-root lock
//!
//! Two invocations sharing one build root would clear each other's work
//! directories. The orchestrator holds this lock for the duration of a
//! build; it is released when dropped.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lock file name inside the build root
pub const LOCK_FILE: &str = ".crossbake.lock";

#[derive(Debug)]
pub struct BuildRootLock {
    file: File,
    path: PathBuf,
}

impl BuildRootLock {
    /// Try to take the lock without blocking
    pub fn acquire(build_root: &Path) -> Result<Self> {
        fs::create_dir_all(build_root)?;
        let path = build_root.join(LOCK_FILE);
        let file = File::create(&path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                fs::write(&path, std::process::id().to_string())?;
                debug!("Acquired build root lock at {}", path.display());
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(Error::Config(format!(
                "Build root {} is in use by another crossbake process",
                build_root.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildRootLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_until_drop() {
        let root = TempDir::new().unwrap();
        let lock = BuildRootLock::acquire(root.path()).unwrap();
        assert!(lock.path().exists());

        let err = BuildRootLock::acquire(root.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        drop(lock);
        BuildRootLock::acquire(root.path()).unwrap();
    }
}
