//! Backend factory: the object registered under a name.

use crate::{AccessKind, OpenFlags, VfsError, VfsFile};

/// A storage backend: produces file handles and manages file names.
///
/// One `Vfs` is registered per name in the [`Registry`](crate::Registry);
/// the engine calls [`open`](Vfs::open) for the database file and for each
/// journal, WAL, or temporary file it needs.
///
/// # Example
///
/// ```rust
/// use dbvfs::{OpenFlags, Vfs, VfsError, VfsFileExt};
///
/// // Generic function that works with any Vfs implementation
/// fn write_header<V: Vfs>(vfs: &V, name: &str) -> Result<(), VfsError> {
///     let (file, _granted) = vfs.open(Some(name), OpenFlags::main_db())?;
///     file.write_all_at(b"header", 0)?;
///     file.close()
/// }
/// ```
pub trait Vfs: Send + Sync {
    /// Open `name`, or an anonymous temporary file when `name` is `None`.
    ///
    /// Returns the handle and the flags actually granted; a backend that can
    /// only open the file read-only reports `READ_ONLY`. Anonymous files are
    /// always delete-on-close.
    ///
    /// # Errors
    ///
    /// - [`VfsError::NotFound`] if the file is missing and `CREATE` is unset
    /// - [`VfsError::AlreadyExists`] for `CREATE | EXCLUSIVE` on an existing file
    /// - [`VfsError::Io`] for underlying I/O errors
    fn open(
        &self,
        name: Option<&str>,
        flags: OpenFlags,
    ) -> Result<(Box<dyn VfsFile>, OpenFlags), VfsError>;

    /// Remove `name`; with `sync_dir`, make the removal itself durable.
    ///
    /// # Errors
    ///
    /// - [`VfsError::NotFound`] if the file does not exist
    /// - [`VfsError::Io`] for underlying I/O errors
    fn delete(&self, name: &str, sync_dir: bool) -> Result<(), VfsError>;

    /// Answer an [`AccessKind`] question about `name`.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Io`] if the question cannot be answered
    fn access(&self, name: &str, kind: AccessKind) -> Result<bool, VfsError>;

    /// Canonical form of `name`, from which the engine derives journal and
    /// WAL names.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Io`] if the name cannot be resolved
    fn full_pathname(&self, name: &str) -> Result<String, VfsError>;
}

impl<V: Vfs + ?Sized> Vfs for std::sync::Arc<V> {
    fn open(
        &self,
        name: Option<&str>,
        flags: OpenFlags,
    ) -> Result<(Box<dyn VfsFile>, OpenFlags), VfsError> {
        (**self).open(name, flags)
    }

    fn delete(&self, name: &str, sync_dir: bool) -> Result<(), VfsError> {
        (**self).delete(name, sync_dir)
    }

    fn access(&self, name: &str, kind: AccessKind) -> Result<bool, VfsError> {
        (**self).access(name, kind)
    }

    fn full_pathname(&self, name: &str) -> Result<String, VfsError> {
        (**self).full_pathname(name)
    }
}
