//! # Lock Protocol
//!
//! The five-level lock state machine, written once over a pluggable
//! arbitration primitive.
//!
//! ## Slots
//!
//! A [`LockArbiter`] exposes three *slots* per file, each of which a handle
//! may hold shared or exclusive. The levels map onto slot holds as follows:
//!
//! | Level     | pending   | reserved  | shared    |
//! |-----------|-----------|-----------|-----------|
//! | None      |           |           |           |
//! | Shared    |           |           | shared    |
//! | Reserved  |           | exclusive | shared    |
//! | Pending   | exclusive | exclusive | shared    |
//! | Exclusive | exclusive | exclusive | exclusive |
//!
//! A reader enters through the pending slot (held shared only while the
//! shared slot is taken), so a Pending writer keeps new readers out without
//! disturbing existing ones. Every level above Shared includes the reserved
//! slot, so at most one writer exists even when the engine skips levels.
//!
//! ## Arbiters
//!
//! | Arbiter | Visibility | Primitive |
//! |---------|------------|-----------|
//! | [`FileArbiter`] | every process | `fs2` advisory locks on sidecar files |
//! | [`MemoryArbiter`] | one [`MemoryLockTable`] | `parking_lot` mutex |

mod file;
mod memory;

pub use file::{FileArbiter, remove_lock_sidecars};
pub use memory::{MemoryArbiter, MemoryLockTable};

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use crate::{LockLevel, VfsError};

/// One of the three arbitration slots behind a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockSlot {
    /// Gate for new readers; held exclusive from Pending upward.
    Pending,
    /// Writer intent; held exclusive from Reserved upward.
    Reserved,
    /// Reader population; held shared by readers, exclusive at Exclusive.
    Shared,
}

impl LockSlot {
    /// All slots, in acquisition order.
    pub const ALL: [LockSlot; 3] = [LockSlot::Pending, LockSlot::Reserved, LockSlot::Shared];

    pub(crate) const fn index(self) -> usize {
        match self {
            LockSlot::Pending => 0,
            LockSlot::Reserved => 1,
            LockSlot::Shared => 2,
        }
    }

    /// Short lowercase name, used in sidecar file names.
    pub const fn name(self) -> &'static str {
        match self {
            LockSlot::Pending => "pending",
            LockSlot::Reserved => "reserved",
            LockSlot::Shared => "shared",
        }
    }
}

impl fmt::Display for LockSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a slot is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotMode {
    /// Compatible with other shared holders.
    Shared,
    /// Compatible with nobody.
    Exclusive,
}

/// Arbitration primitive for one handle.
///
/// Each handle owns its own arbiter; two arbiters for the same file contend
/// with each other exactly as two processes would. Implementations never
/// block on contention.
pub trait LockArbiter: Send {
    /// Try to hold `slot` in `mode`, converting an existing hold if needed.
    ///
    /// Returns `Ok(false)` when another holder conflicts. A refused attempt
    /// leaves any previous hold on `slot` in place.
    ///
    /// # Errors
    ///
    /// Any failure of the primitive, including a previous hold that could not
    /// be restored after a refused conversion.
    fn try_acquire(&mut self, slot: LockSlot, mode: SlotMode) -> io::Result<bool>;

    /// Drop any hold on `slot`. Releasing an unheld slot is a no-op.
    ///
    /// # Errors
    ///
    /// Any failure of the primitive.
    fn release(&mut self, slot: LockSlot) -> io::Result<()>;

    /// Returns `true` if a holder other than this arbiter holds `slot`
    /// exclusively.
    ///
    /// # Errors
    ///
    /// Any failure of the primitive.
    fn held_elsewhere(&mut self, slot: LockSlot) -> io::Result<bool>;
}

/// The lock state machine of one handle.
///
/// Tracks the level held and drives an arbiter rung by rung. Not
/// synchronized itself: backends keep it behind a per-handle mutex.
///
/// # Example
///
/// ```rust
/// use dbvfs::{LockLevel, LockMachine, MemoryLockTable};
///
/// let table = MemoryLockTable::new();
/// let mut writer = LockMachine::new("app.db", table.arbiter("app.db"));
/// let mut reader = LockMachine::new("app.db", table.arbiter("app.db"));
///
/// reader.lock(LockLevel::Shared).unwrap();
/// writer.lock(LockLevel::Reserved).unwrap();
/// assert!(reader.check_reserved_lock().unwrap());
///
/// // The writer reaches Pending but cannot pass the remaining reader.
/// let err = writer.lock(LockLevel::Exclusive).unwrap_err();
/// assert!(err.is_busy());
/// assert_eq!(writer.level(), LockLevel::Pending);
///
/// reader.unlock(LockLevel::None).unwrap();
/// writer.lock(LockLevel::Exclusive).unwrap();
/// ```
#[derive(Debug)]
pub struct LockMachine<A: LockArbiter> {
    path: PathBuf,
    level: LockLevel,
    arbiter: A,
}

impl<A: LockArbiter> LockMachine<A> {
    /// Start at [`LockLevel::None`] for the file at `path`.
    pub fn new(path: impl Into<PathBuf>, arbiter: A) -> Self {
        Self {
            path: path.into(),
            level: LockLevel::None,
            arbiter,
        }
    }

    /// The level currently held.
    #[inline]
    pub fn level(&self) -> LockLevel {
        self.level
    }

    /// The file this machine locks.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Climb to `target`, one rung at a time.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Busy`] when a rung is refused; the machine stays on
    ///   the last rung it reached
    /// - [`VfsError::Io`] when the arbiter fails
    pub fn lock(&mut self, target: LockLevel) -> Result<(), VfsError> {
        while self.level < target {
            let Some(next) = self.level.next() else {
                break;
            };
            let granted = self.step_up(next).map_err(|source| {
                let operation = if next == LockLevel::Shared {
                    "lock_shared"
                } else {
                    "lock"
                };
                VfsError::io(operation, &self.path, source)
            })?;
            if !granted {
                debug!(
                    path = %self.path.display(),
                    requested = %target,
                    held = %self.level,
                    "lock busy"
                );
                return Err(VfsError::Busy {
                    path: self.path.clone(),
                    requested: target,
                    held: self.level,
                });
            }
            trace!(path = %self.path.display(), from = %self.level, to = %next, "lock step");
            self.level = next;
        }
        Ok(())
    }

    /// Descend to `target`, one rung at a time.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Io`] when the arbiter fails
    /// - [`VfsError::LockProtocol`] when the shared slot cannot be
    ///   downgraded from exclusive
    pub fn unlock(&mut self, target: LockLevel) -> Result<(), VfsError> {
        while self.level > target {
            let Some(prev) = self.level.prev() else {
                break;
            };
            let released = self
                .step_down(self.level)
                .map_err(|source| VfsError::io("unlock", &self.path, source))?;
            if !released {
                return Err(VfsError::LockProtocol {
                    path: self.path.clone(),
                    details: format!("cannot downgrade shared slot from {}", self.level),
                });
            }
            trace!(path = %self.path.display(), from = %self.level, to = %prev, "unlock step");
            self.level = prev;
        }
        Ok(())
    }

    /// Returns `true` if this handle or any other holds Reserved or above.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Io`] when the arbiter fails
    pub fn check_reserved_lock(&mut self) -> Result<bool, VfsError> {
        if self.level.is_write_intent() {
            return Ok(true);
        }
        self.arbiter
            .held_elsewhere(LockSlot::Reserved)
            .map_err(|source| VfsError::io("check_reserved_lock", &self.path, source))
    }

    fn step_up(&mut self, next: LockLevel) -> io::Result<bool> {
        match next {
            LockLevel::None => Ok(true),
            LockLevel::Shared => {
                if !self.arbiter.try_acquire(LockSlot::Pending, SlotMode::Shared)? {
                    return Ok(false);
                }
                let acquired = self.arbiter.try_acquire(LockSlot::Shared, SlotMode::Shared);
                let released = self.arbiter.release(LockSlot::Pending);
                let acquired = acquired?;
                released?;
                Ok(acquired)
            }
            LockLevel::Reserved => self
                .arbiter
                .try_acquire(LockSlot::Reserved, SlotMode::Exclusive),
            LockLevel::Pending => self
                .arbiter
                .try_acquire(LockSlot::Pending, SlotMode::Exclusive),
            LockLevel::Exclusive => self
                .arbiter
                .try_acquire(LockSlot::Shared, SlotMode::Exclusive),
        }
    }

    fn step_down(&mut self, from: LockLevel) -> io::Result<bool> {
        match from {
            LockLevel::None => Ok(true),
            // The pending slot is still ours, so no one can claim the shared
            // slot exclusively while it is converted.
            LockLevel::Exclusive => self.arbiter.try_acquire(LockSlot::Shared, SlotMode::Shared),
            LockLevel::Pending => self.arbiter.release(LockSlot::Pending).map(|()| true),
            LockLevel::Reserved => self.arbiter.release(LockSlot::Reserved).map(|()| true),
            LockLevel::Shared => self.arbiter.release(LockSlot::Shared).map(|()| true),
        }
    }
}

impl<A: LockArbiter> Drop for LockMachine<A> {
    fn drop(&mut self) {
        if self.level == LockLevel::None {
            return;
        }
        warn!(
            path = %self.path.display(),
            level = %self.level,
            "handle dropped while holding a lock"
        );
        if let Err(err) = self.unlock(LockLevel::None) {
            warn!(path = %self.path.display(), error = %err, "failed to release lock on drop");
        }
    }
}
