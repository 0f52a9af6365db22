//! Tracing middleware.

use tracing::{debug, trace};

use crate::{
    AccessKind, DeviceCharacteristics, FileDevice, FileIo, FileLock, Layer, LockLevel,
    OpenFlags, SyncLevel, Vfs, VfsError, VfsFile,
};

/// Layer that emits `tracing` events for every backend and file call.
///
/// Per-I/O events are `trace!`; opens, closes, lock transitions and errors
/// are `debug!`. Behaviour is otherwise unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLayer {
    _priv: (),
}

impl TracingLayer {
    /// A new tracing layer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<V: Vfs> Layer<V> for TracingLayer {
    type Backend = TracedVfs<V>;

    fn layer(self, backend: V) -> Self::Backend {
        TracedVfs { inner: backend }
    }
}

/// Backend wrapped by [`TracingLayer`].
#[derive(Debug, Clone)]
pub struct TracedVfs<V> {
    inner: V,
}

impl<V> TracedVfs<V> {
    /// The wrapped backend.
    pub fn inner(&self) -> &V {
        &self.inner
    }
}

impl<V: Vfs> Vfs for TracedVfs<V> {
    fn open(
        &self,
        name: Option<&str>,
        flags: OpenFlags,
    ) -> Result<(Box<dyn VfsFile>, OpenFlags), VfsError> {
        let label = name.unwrap_or("<temp>");
        match self.inner.open(name, flags) {
            Ok((file, granted)) => {
                debug!(file = label, requested = ?flags, granted = ?granted, "vfs open");
                let traced = TracedFile {
                    name: label.to_owned(),
                    inner: file,
                };
                Ok((Box::new(traced), granted))
            }
            Err(err) => {
                debug!(file = label, flags = ?flags, error = %err, "vfs open failed");
                Err(err)
            }
        }
    }

    fn delete(&self, name: &str, sync_dir: bool) -> Result<(), VfsError> {
        let result = self.inner.delete(name, sync_dir);
        debug!(file = name, sync_dir, ok = result.is_ok(), "vfs delete");
        result
    }

    fn access(&self, name: &str, kind: AccessKind) -> Result<bool, VfsError> {
        let result = self.inner.access(name, kind);
        trace!(file = name, kind = ?kind, result = ?result.as_ref().ok(), "vfs access");
        result
    }

    fn full_pathname(&self, name: &str) -> Result<String, VfsError> {
        let result = self.inner.full_pathname(name);
        trace!(file = name, full = ?result.as_ref().ok(), "vfs full_pathname");
        result
    }
}

/// File opened through a [`TracedVfs`].
pub struct TracedFile {
    name: String,
    inner: Box<dyn VfsFile>,
}

impl std::fmt::Debug for TracedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracedFile")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl TracedFile {
    fn note<T>(&self, operation: &'static str, result: &Result<T, VfsError>) {
        if let Err(err) = result {
            debug!(file = %self.name, operation, error = %err, "file call failed");
        }
    }
}

impl FileIo for TracedFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, VfsError> {
        let result = self.inner.read_at(buf, offset);
        trace!(
            file = %self.name,
            offset,
            len = buf.len(),
            read = ?result.as_ref().ok(),
            "read_at"
        );
        self.note("read", &result);
        result
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize, VfsError> {
        let result = self.inner.write_at(buf, offset);
        trace!(
            file = %self.name,
            offset,
            len = buf.len(),
            written = ?result.as_ref().ok(),
            "write_at"
        );
        self.note("write", &result);
        result
    }

    fn truncate(&self, size: u64) -> Result<(), VfsError> {
        let result = self.inner.truncate(size);
        trace!(file = %self.name, size, "truncate");
        self.note("truncate", &result);
        result
    }

    fn sync(&self, level: SyncLevel) -> Result<(), VfsError> {
        let result = self.inner.sync(level);
        trace!(file = %self.name, level = %level, "sync");
        self.note("sync", &result);
        result
    }

    fn file_size(&self) -> Result<u64, VfsError> {
        let result = self.inner.file_size();
        trace!(file = %self.name, size = ?result.as_ref().ok(), "file_size");
        self.note("file_size", &result);
        result
    }

    fn close(self: Box<Self>) -> Result<(), VfsError> {
        let TracedFile { name, inner } = *self;
        let result = inner.close();
        debug!(file = %name, ok = result.is_ok(), "close");
        result
    }
}

impl FileLock for TracedFile {
    fn lock(&self, level: LockLevel) -> Result<(), VfsError> {
        let from = self.inner.lock_level();
        let result = self.inner.lock(level);
        debug!(
            file = %self.name,
            from = %from,
            requested = %level,
            held = %self.inner.lock_level(),
            busy = result.as_ref().is_err_and(VfsError::is_busy),
            "lock"
        );
        result
    }

    fn unlock(&self, level: LockLevel) -> Result<(), VfsError> {
        let from = self.inner.lock_level();
        let result = self.inner.unlock(level);
        debug!(file = %self.name, from = %from, to = %level, "unlock");
        self.note("unlock", &result);
        result
    }

    fn check_reserved_lock(&self) -> Result<bool, VfsError> {
        let result = self.inner.check_reserved_lock();
        trace!(file = %self.name, reserved = ?result.as_ref().ok(), "check_reserved_lock");
        self.note("check_reserved_lock", &result);
        result
    }

    fn lock_level(&self) -> LockLevel {
        self.inner.lock_level()
    }
}

impl FileDevice for TracedFile {
    fn sector_size(&self) -> u32 {
        self.inner.sector_size()
    }

    fn device_characteristics(&self) -> DeviceCharacteristics {
        self.inner.device_characteristics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LayerExt, MemoryVfs};

    #[test]
    fn traced_backend_behaves_like_inner() {
        let vfs = MemoryVfs::new().layer(TracingLayer::new());
        let (file, granted) = vfs.open(Some("db"), OpenFlags::main_db()).unwrap();
        assert!(granted.is_writable());

        assert_eq!(file.write_at(b"traced", 0).unwrap(), 6);
        let mut buf = [0u8; 6];
        assert_eq!(file.read_at(&mut buf, 0).unwrap(), 6);
        assert_eq!(&buf, b"traced");

        file.lock(LockLevel::Exclusive).unwrap();
        assert_eq!(file.lock_level(), LockLevel::Exclusive);
        file.unlock(LockLevel::None).unwrap();
        file.close().unwrap();

        assert!(vfs.access("db", AccessKind::Exists).unwrap());
        assert!(vfs.inner().access("db", AccessKind::Exists).unwrap());
        vfs.delete("db", false).unwrap();
    }

    #[test]
    fn traced_errors_pass_through() {
        let vfs = MemoryVfs::new().layer(TracingLayer::new());
        assert!(matches!(
            vfs.open(Some("missing"), OpenFlags::READ_WRITE),
            Err(VfsError::NotFound { .. })
        ));

        let (a, _) = vfs.open(Some("db"), OpenFlags::main_db()).unwrap();
        let (b, _) = vfs.open(Some("db"), OpenFlags::main_db()).unwrap();
        a.lock(LockLevel::Exclusive).unwrap();
        assert!(b.lock(LockLevel::Shared).unwrap_err().is_busy());
    }
}
