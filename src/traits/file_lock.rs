//! Locking operations on an open backend file.
//!
//! This module provides the [`FileLock`] trait, the handle-facing side of the
//! five-level lock protocol:
//!
//! ```text
//! None ──▶ Shared ──▶ Reserved ──▶ Pending ──▶ Exclusive
//!   ◀────────────── unlock to any lower level ──────────
//! ```
//!
//! - **Shared**: any number of readers
//! - **Reserved**: one writer-to-be, readers still admitted
//! - **Pending**: one writer draining readers, new readers refused
//! - **Exclusive**: one writer, nobody else
//!
//! Levels are visible to every process sharing the file. A request that a
//! conflicting holder prevents fails with [`VfsError::Busy`], never with a
//! generic I/O error, so the engine can tell contention from failure.
//!
//! # Example
//!
//! ```rust
//! use dbvfs::{FileLock, LockLevel, VfsError};
//!
//! // Generic commit path that works with any FileLock implementation
//! fn acquire_for_commit<F: FileLock + ?Sized>(file: &F) -> Result<(), VfsError> {
//!     file.lock(LockLevel::Shared)?;
//!     file.lock(LockLevel::Reserved)?;
//!     match file.lock(LockLevel::Exclusive) {
//!         Ok(()) => Ok(()),
//!         Err(err) if err.is_busy() => {
//!             // Still Pending: new readers are kept out while we retry.
//!             file.unlock(LockLevel::None)?;
//!             Err(err)
//!         }
//!         Err(err) => Err(err),
//!     }
//! }
//! ```

use crate::{LockLevel, VfsError};

/// The lock protocol on one open file.
///
/// See the [module docs](self) for the level semantics.
pub trait FileLock: Send + Sync {
    /// Raise the handle's lock to `level`.
    ///
    /// A request at or below the current level is a no-op. A request that
    /// skips levels climbs every intermediate rung, so the handle never ends
    /// up holding a level it did not acquire. On failure the handle keeps the
    /// highest rung it reached; [`lock_level`](FileLock::lock_level) reports
    /// it.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Busy`] if another holder conflicts
    /// - [`VfsError::Io`] if the arbitration primitive fails
    fn lock(&self, level: LockLevel) -> Result<(), VfsError>;

    /// Lower the handle's lock to `level`.
    ///
    /// A request at or above the current level is a no-op.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Io`] if the arbitration primitive fails
    fn unlock(&self, level: LockLevel) -> Result<(), VfsError>;

    /// Returns `true` if any holder, in this process or another, holds
    /// Reserved, Pending, or Exclusive on the file.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Io`] if the arbitration primitive fails
    fn check_reserved_lock(&self) -> Result<bool, VfsError>;

    /// The level this handle currently holds.
    fn lock_level(&self) -> LockLevel;
}
