//! # Extension Traits
//!
//! Engine-side helpers for open files.
//!
//! ## Overview
//!
//! [`VfsFileExt`] carries the obligations of the *consuming* side of the
//! contract: zero-filling after a short read and refusing to treat a partial
//! write as success. It is blanket-implemented, so every [`VfsFile`] (trait
//! objects included) gets it for free.
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`read_exact_at`](VfsFileExt::read_exact_at) | Fill a buffer, zero-padding past end of file |
//! | [`write_all_at`](VfsFileExt::write_all_at) | Write a buffer or fail with [`VfsError::ShortWrite`] |

use std::io;
use std::path::PathBuf;

use crate::{VfsError, VfsFile};

/// How much of a buffer [`read_exact_at`](VfsFileExt::read_exact_at) found
/// in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The whole buffer came from the file.
    Full,
    /// The file ended early; bytes after `read` were zero-filled.
    Short {
        /// Bytes that came from the file.
        read: usize,
    },
}

impl ReadOutcome {
    /// Returns `true` for [`ReadOutcome::Short`].
    #[inline]
    pub fn is_short(&self) -> bool {
        matches!(self, ReadOutcome::Short { .. })
    }
}

/// Extension methods for any open file.
///
/// # Example
///
/// ```rust
/// use dbvfs::{MemoryVfs, OpenFlags, ReadOutcome, Vfs, VfsFileExt};
///
/// let vfs = MemoryVfs::new();
/// let (file, _) = vfs.open(Some("app.db"), OpenFlags::main_db()).unwrap();
/// file.write_all_at(b"abc", 0).unwrap();
///
/// let mut page = [0xffu8; 8];
/// let outcome = file.read_exact_at(&mut page, 0).unwrap();
/// assert_eq!(outcome, ReadOutcome::Short { read: 3 });
/// assert_eq!(&page, b"abc\0\0\0\0\0");
/// ```
pub trait VfsFileExt: VfsFile {
    /// Read `buf.len()` bytes at `offset`, zero-filling whatever lies past
    /// the end of the file.
    ///
    /// # Errors
    ///
    /// Any error from [`read_at`](crate::FileIo::read_at).
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<ReadOutcome, VfsError> {
        let mut filled = 0;
        while filled < buf.len() {
            let at = offset.checked_add(filled as u64).ok_or_else(|| {
                VfsError::io(
                    "read",
                    PathBuf::new(),
                    io::Error::new(io::ErrorKind::InvalidInput, "read runs past the largest offset"),
                )
            })?;
            let n = self.read_at(&mut buf[filled..], at)?;
            if n == 0 {
                break;
            }
            filled += n.min(buf.len() - filled);
        }
        if filled == buf.len() {
            return Ok(ReadOutcome::Full);
        }
        buf[filled..].fill(0);
        Ok(ReadOutcome::Short { read: filled })
    }

    /// Write all of `buf` at `offset`.
    ///
    /// A backend that reports fewer bytes than requested without an error
    /// has broken the contract; the write is reported as
    /// [`VfsError::ShortWrite`] with an empty path, since the handle does not
    /// know its name. The rest of the buffer is not retried.
    ///
    /// # Errors
    ///
    /// - [`VfsError::ShortWrite`] for a partial write
    /// - any error from [`write_at`](crate::FileIo::write_at)
    fn write_all_at(&self, buf: &[u8], offset: u64) -> Result<(), VfsError> {
        let written = self.write_at(buf, offset)?;
        if written < buf.len() {
            return Err(VfsError::ShortWrite {
                path: PathBuf::new(),
                offset,
                written,
                expected: buf.len(),
            });
        }
        Ok(())
    }
}

impl<T: VfsFile + ?Sized> VfsFileExt for T {}
