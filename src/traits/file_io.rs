//! Byte-level I/O on an open backend file.

use crate::{SyncLevel, VfsError};

/// Byte-level I/O, sizing, durability, and close for one open file.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`. Methods take `&self`; backends
/// serialize concurrent calls on one handle internally.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn FileIo`.
pub trait FileIo: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read, in `0..=buf.len()`. Returning fewer
    /// bytes than requested is a *short read*, not an error: the caller
    /// treats the unread tail as zeros. Backends must not pad the tail
    /// themselves.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Io`] for underlying I/O errors
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, VfsError>;

    /// Write `buf` at `offset`.
    ///
    /// Returns `buf.len()` on success. A backend that writes only part of the
    /// buffer must return [`VfsError::ShortWrite`] carrying the partial count;
    /// `Ok(n)` with `n < buf.len()` violates the contract.
    ///
    /// # Errors
    ///
    /// - [`VfsError::ShortWrite`] if only part of `buf` reached the store
    /// - [`VfsError::ReadOnly`] if the handle was opened read-only
    /// - [`VfsError::Io`] for underlying I/O errors
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize, VfsError>;

    /// Set the exact file length.
    ///
    /// Extending zero-fills; shrinking discards the tail.
    ///
    /// # Errors
    ///
    /// - [`VfsError::ReadOnly`] if the handle was opened read-only
    /// - [`VfsError::Io`] for underlying I/O errors
    fn truncate(&self, size: u64) -> Result<(), VfsError>;

    /// Durability barrier.
    ///
    /// Must not return before the guarantee of `level` holds for every write
    /// issued earlier on this handle. Implementing a level as a stronger one
    /// is allowed; implementing [`SyncLevel::Full`] as anything weaker is not.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Io`] if the flush fails
    fn sync(&self, level: SyncLevel) -> Result<(), VfsError>;

    /// Current logical length in bytes.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Io`] if the size cannot be determined
    fn file_size(&self) -> Result<u64, VfsError>;

    /// Release every lock and resource held by the handle.
    ///
    /// Consumes the handle. Dropping a handle without calling `close` must
    /// also release its locks, but `close` is the only way to observe
    /// failures.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Io`] if releasing a lock or removing a
    ///   delete-on-close file fails
    fn close(self: Box<Self>) -> Result<(), VfsError>;
}
