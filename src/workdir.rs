//! Scoped process working directory
//!
//! The process working directory is global state. `ScopedWorkingDirectory`
//! holds a process-wide lock for as long as it is alive, so at most one guard
//! can have the directory changed at a time, and restores the previous
//! directory when dropped, including during unwinding.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, error};

static WORKDIR_LOCK: Mutex<()> = Mutex::new(());

/// Changes the working directory until dropped
#[must_use = "the previous directory is restored as soon as the guard is dropped"]
pub struct ScopedWorkingDirectory {
    previous: PathBuf,
    restored: bool,
    _lock: MutexGuard<'static, ()>,
}

impl ScopedWorkingDirectory {
    /// Record the current directory and change to `path`
    pub fn enter(path: impl AsRef<Path>) -> std::io::Result<Self> {
        // A panic while another guard was alive still restored the directory
        // in Drop, so a poisoned lock carries no broken state.
        let lock = WORKDIR_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous = std::env::current_dir()?;
        std::env::set_current_dir(path.as_ref())?;
        debug!(
            from = %previous.display(),
            to = %path.as_ref().display(),
            "entered working directory"
        );

        Ok(Self {
            previous,
            restored: false,
            _lock: lock,
        })
    }

    /// Directory that will be restored
    pub fn previous(&self) -> &Path {
        &self.previous
    }

    /// Restore the previous directory, reporting failure
    pub fn exit(mut self) -> std::io::Result<()> {
        self.restore()
    }

    fn restore(&mut self) -> std::io::Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        std::env::set_current_dir(&self.previous)?;
        debug!(to = %self.previous.display(), "restored working directory");
        Ok(())
    }
}

impl Drop for ScopedWorkingDirectory {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            error!(
                dir = %self.previous.display(),
                error = %e,
                "failed to restore working directory"
            );
        }
    }
}
