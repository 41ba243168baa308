//! Exclusive lock on a service slot directory.
//!
//! The lock is an advisory OS file lock on a hold file inside the slot. The
//! operating system drops it when the holding process exits for any reason,
//! so a slot left behind by a crashed process is immediately reclaimable.

use crate::config::LayoutConfig;
use crate::error::{Result, SvcLockError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A held exclusive lock on one service slot.
///
/// Dropping the value closes the hold file, which releases the lock.
#[derive(Debug)]
pub struct SlotLock {
    file: File,
    hold_path: PathBuf,
}

impl SlotLock {
    /// Try to lock `slot_dir` without waiting.
    ///
    /// Returns `Ok(None)` when another handle holds the lock. The slot
    /// directory must already exist. Blocking I/O runs on the blocking pool.
    pub async fn try_acquire(slot_dir: PathBuf) -> Result<Option<Self>> {
        tokio::task::spawn_blocking(move || Self::try_acquire_blocking(&slot_dir)).await?
    }

    fn try_acquire_blocking(slot_dir: &Path) -> Result<Option<Self>> {
        let hold_path = slot_dir.join(LayoutConfig::HOLD_FILE_NAME);

        // No truncate: a live holder's pid must survive a losing opener.
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&hold_path)
            .map_err(|e| SvcLockError::io_with_path(e, &hold_path))?;

        if let Err(e) = file.try_lock_exclusive() {
            if is_contended(&e) {
                debug!("Slot already held: {}", slot_dir.display());
                return Ok(None);
            }
            return Err(SvcLockError::io_with_path(e, &hold_path));
        }

        if let Err(e) = write_pid(&mut file) {
            warn!(
                "Failed to record holder pid in {}: {}",
                hold_path.display(),
                e
            );
        }

        Ok(Some(Self { file, hold_path }))
    }

    /// Path of the hold file carrying the lock.
    pub fn hold_path(&self) -> &Path {
        &self.hold_path
    }

    /// Release the lock explicitly and clear the recorded pid.
    pub fn release(self) -> Result<()> {
        if let Err(e) = self.file.set_len(0) {
            debug!("Failed to clear {}: {}", self.hold_path.display(), e);
        }
        self.file
            .unlock()
            .map_err(|e| SvcLockError::io_with_path(e, &self.hold_path))
    }

    /// Keep the lock until the process exits.
    pub fn hold_for_process(self) {
        debug!("Holding {} until process exit", self.hold_path.display());
        std::mem::forget(self.file);
    }

    /// Pid recorded by the current or most recent holder of `slot_dir`.
    ///
    /// Only [`SlotLock::release`] clears the pid. A hold that was dropped, or
    /// whose process died, leaves its pid behind, so the value may name a
    /// process that no longer holds the slot or no longer exists. Reading it
    /// never touches the lock.
    pub async fn holder_pid(slot_dir: PathBuf) -> Option<u32> {
        let hold_path = slot_dir.join(LayoutConfig::HOLD_FILE_NAME);
        let contents = tokio::fs::read_to_string(&hold_path).await.ok()?;
        contents.trim().parse().ok()
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn write_pid(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{}", std::process::id())?;
    file.flush()
}
