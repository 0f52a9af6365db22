//! Cross-process lock arbitration with OS advisory locks.
//!
//! Each slot is a sidecar file next to the locked file:
//!
//! ```text
//! app.db
//! app.db-pending.lock
//! app.db-reserved.lock
//! app.db-shared.lock
//! ```
//!
//! Holds use `fs2` (`flock` on Unix, `LockFileEx` on Windows). Those locks
//! belong to the open file, not the process, so every arbiter opens its own
//! descriptors and two handles in one process contend like two processes.
//! Sidecars are created lazily on first use. They outlive the handles that
//! use them and are only removed by [`remove_lock_sidecars`], which skips any
//! sidecar another holder still has: deleting a held one would split the
//! lock in two.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use super::{LockArbiter, LockSlot, SlotMode};

#[derive(Debug)]
struct SlotFile {
    file: File,
    held: Option<SlotMode>,
}

/// Arbiter backed by advisory locks on sidecar files.
#[derive(Debug)]
pub struct FileArbiter {
    base: PathBuf,
    slots: [Option<SlotFile>; 3],
}

impl FileArbiter {
    /// Arbiter for the file at `base`. No file is touched until a slot is
    /// first used.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            slots: [None, None, None],
        }
    }

    /// Path of the sidecar file behind `slot`.
    pub fn slot_path(&self, slot: LockSlot) -> PathBuf {
        sidecar_path(&self.base, slot)
    }

    fn slot_file(&mut self, slot: LockSlot) -> io::Result<&mut SlotFile> {
        let entry = &mut self.slots[slot.index()];
        if entry.is_none() {
            let path = sidecar_path(&self.base, slot);
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            debug!(path = %path.display(), "opened lock sidecar");
            *entry = Some(SlotFile { file, held: None });
        }
        entry
            .as_mut()
            .ok_or_else(|| io::Error::other("lock sidecar missing after open"))
    }
}

/// Sidecar file name for `slot` of the file at `base`.
pub(crate) fn sidecar_path(base: &Path, slot: LockSlot) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push("-");
    name.push(slot.name());
    name.push(".lock");
    PathBuf::from(name)
}

/// Remove the sidecars of the file at `base` that nobody holds.
///
/// Each sidecar is taken exclusively before it is unlinked, so a sidecar with
/// a live holder stays. Returns how many sidecars were removed.
///
/// Only call this once the file itself is gone: a handle that opened a
/// sidecar but has not locked it yet would otherwise end up locking an
/// unlinked file.
///
/// # Errors
///
/// Any failure to open, lock or remove a sidecar other than it being
/// missing or held.
pub fn remove_lock_sidecars(base: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for slot in LockSlot::ALL {
        let path = sidecar_path(base, slot);
        let file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        if !try_hold(&file, SlotMode::Exclusive)? {
            debug!(path = %path.display(), "lock sidecar still held, keeping it");
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        // Dropping `file` releases the hold on the unlinked sidecar.
    }
    Ok(removed)
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

// Called through the trait path: newer std has inherent `File` lock methods
// with a different error type that would otherwise shadow these.
fn try_hold(file: &File, mode: SlotMode) -> io::Result<bool> {
    let result = match mode {
        SlotMode::Shared => FileExt::try_lock_shared(file),
        SlotMode::Exclusive => FileExt::try_lock_exclusive(file),
    };
    match result {
        Ok(()) => Ok(true),
        Err(err) if is_contended(&err) => Ok(false),
        Err(err) => Err(err),
    }
}

impl LockArbiter for FileArbiter {
    fn try_acquire(&mut self, slot: LockSlot, mode: SlotMode) -> io::Result<bool> {
        let entry = self.slot_file(slot)?;
        match entry.held {
            Some(held) if held == mode => Ok(true),
            None => {
                let granted = try_hold(&entry.file, mode)?;
                if granted {
                    entry.held = Some(mode);
                }
                Ok(granted)
            }
            Some(previous) => {
                // Conversions are not atomic on every platform: drop, retry,
                // and restore the previous hold if the new one is refused.
                FileExt::unlock(&entry.file)?;
                entry.held = None;
                if try_hold(&entry.file, mode)? {
                    entry.held = Some(mode);
                    return Ok(true);
                }
                if try_hold(&entry.file, previous)? {
                    entry.held = Some(previous);
                    return Ok(false);
                }
                warn!(slot = %slot, "lost slot hold during refused conversion");
                Err(io::Error::other(format!(
                    "lost {previous:?} hold on {slot} slot during conversion"
                )))
            }
        }
    }

    fn release(&mut self, slot: LockSlot) -> io::Result<()> {
        if let Some(entry) = self.slots[slot.index()].as_mut() {
            if entry.held.is_some() {
                FileExt::unlock(&entry.file)?;
                entry.held = None;
            }
        }
        Ok(())
    }

    // Checks by taking the slot shared for an instant. While that hold lasts
    // another handle's exclusive request on the slot is refused, so a
    // concurrent Reserved request can fail busy with no writer present.
    fn held_elsewhere(&mut self, slot: LockSlot) -> io::Result<bool> {
        let entry = self.slot_file(slot)?;
        if entry.held.is_some() {
            // Any hold of ours excludes an exclusive holder elsewhere.
            return Ok(false);
        }
        if try_hold(&entry.file, SlotMode::Shared)? {
            FileExt::unlock(&entry.file)?;
            Ok(false)
        } else {
            Ok(true)
        }
    }
}
