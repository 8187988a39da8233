//! Exclusive lock files kept next to the file they guard.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A held `<file>.lock`, removed again when dropped
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Lock path for `target`: the same file name with `.lock` appended
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use pair_solver::utils::lock::LockFile;
    ///
    /// assert_eq!(
    ///     LockFile::path_for(Path::new("/data/pool.json")),
    ///     Path::new("/data/pool.json.lock")
    /// );
    /// ```
    #[must_use]
    pub fn path_for(target: &Path) -> PathBuf {
        let mut name = target
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".lock");
        target.with_file_name(name)
    }

    /// Create the lock file at `path`.
    ///
    /// # Errors
    ///
    /// Fails with `ErrorKind::AlreadyExists` while another holder has the lock, or
    /// with the underlying I/O error.
    pub fn acquire(path: &Path) -> std::io::Result<Self> {
        OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove lock file");
        }
    }
}
