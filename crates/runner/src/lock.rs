//! Exclusive workspace lock.
//!
//! Two eager runs against one workspace would race on the same archive and
//! registry folder, so each run holds an advisory lock on
//! `<workspace>/.vcpkg-prebuild.lock`. A second run waits for the first.

use fs4::tokio::AsyncFileExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File, OpenOptions};
use tracing::{debug, info};
use vcpkg_prebuild_core::{Error, Result};

/// Delay between attempts while another run holds the lock.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Held for the duration of a run; released on drop.
#[derive(Debug)]
pub struct WorkspaceLock {
    _file: File,
    path: PathBuf,
}

impl WorkspaceLock {
    /// Wait until the lock at `path` is ours.
    ///
    /// The lock is polled without blocking, so a waiting run never stalls
    /// the runtime thread the holder needs to finish.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the lock file cannot be created or locked.
    pub async fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(e, Some(parent.to_path_buf()), "create_dir_all"))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await
            .map_err(|e| Error::io(e, Some(path.to_path_buf()), "open lock file"))?;

        let mut announced = false;
        while !file
            .try_lock_exclusive()
            .map_err(|e| Error::io(e, Some(path.to_path_buf()), "lock workspace"))?
        {
            if !announced {
                info!(lock = %path.display(), "Waiting for another run to release the workspace");
                announced = true;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        debug!(lock = %path.display(), "Acquired workspace lock");
        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
