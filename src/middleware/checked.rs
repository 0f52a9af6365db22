//! Contract-checking middleware.

use std::io;
use std::path::PathBuf;

use tracing::warn;

use crate::{
    AccessKind, DeviceCharacteristics, FileDevice, FileIo, FileLock, Layer, LockLevel,
    OpenFlags, SyncLevel, Vfs, VfsError, VfsFile,
};

/// Layer that holds an inner backend to the storage contract.
///
/// Violations the engine could not survive are turned into errors:
///
/// | Inner backend does | Caller sees |
/// |--------------------|-------------|
/// | `write_at` returns `Ok(n)` with `n < len` | [`VfsError::ShortWrite`] |
/// | `read_at` or `write_at` reports more bytes than the buffer | [`VfsError::Io`] |
/// | `lock` succeeds without reaching the level, or overshoots it | [`VfsError::LockProtocol`] |
/// | `lock` fails busy yet holds the requested level | [`VfsError::LockProtocol`] |
/// | `unlock` succeeds but stays above the level | [`VfsError::LockProtocol`] |
/// | device characteristics with undefined bits | the bits are masked off |
///
/// Useful in front of third-party backends and in their test suites.
///
/// # Example
///
/// ```rust
/// use dbvfs::{CheckedLayer, LayerExt, MemoryVfs, OpenFlags, Vfs};
///
/// let vfs = MemoryVfs::new().layer(CheckedLayer::new());
/// let (file, _) = vfs.open(Some("app.db"), OpenFlags::main_db()).unwrap();
/// assert_eq!(file.write_at(b"ok", 0).unwrap(), 2);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckedLayer {
    _priv: (),
}

impl CheckedLayer {
    /// A new checking layer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<V: Vfs> Layer<V> for CheckedLayer {
    type Backend = CheckedVfs<V>;

    fn layer(self, backend: V) -> Self::Backend {
        CheckedVfs { inner: backend }
    }
}

/// Backend wrapped by [`CheckedLayer`].
#[derive(Debug, Clone)]
pub struct CheckedVfs<V> {
    inner: V,
}

impl<V> CheckedVfs<V> {
    /// The wrapped backend.
    pub fn inner(&self) -> &V {
        &self.inner
    }
}

impl<V: Vfs> Vfs for CheckedVfs<V> {
    fn open(
        &self,
        name: Option<&str>,
        flags: OpenFlags,
    ) -> Result<(Box<dyn VfsFile>, OpenFlags), VfsError> {
        let (file, granted) = self.inner.open(name, flags)?;
        let checked = CheckedFile {
            path: PathBuf::from(name.unwrap_or("<temp>")),
            inner: file,
        };
        Ok((Box::new(checked), granted))
    }

    fn delete(&self, name: &str, sync_dir: bool) -> Result<(), VfsError> {
        self.inner.delete(name, sync_dir)
    }

    fn access(&self, name: &str, kind: AccessKind) -> Result<bool, VfsError> {
        self.inner.access(name, kind)
    }

    fn full_pathname(&self, name: &str) -> Result<String, VfsError> {
        self.inner.full_pathname(name)
    }
}

/// File opened through a [`CheckedVfs`].
pub struct CheckedFile {
    path: PathBuf,
    inner: Box<dyn VfsFile>,
}

impl std::fmt::Debug for CheckedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckedFile")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CheckedFile {
    /// Wrap a handle from any backend.
    pub fn new(path: impl Into<PathBuf>, inner: Box<dyn VfsFile>) -> Self {
        Self {
            path: path.into(),
            inner,
        }
    }

    fn overrun(&self, operation: &'static str, reported: usize, len: usize) -> VfsError {
        warn!(path = %self.path.display(), operation, reported, len, "backend overran buffer");
        VfsError::io(
            operation,
            &self.path,
            io::Error::other(format!("backend reported {reported} bytes for a {len}-byte buffer")),
        )
    }

    fn protocol(&self, details: String) -> VfsError {
        warn!(path = %self.path.display(), details = %details, "backend broke the lock protocol");
        VfsError::LockProtocol {
            path: self.path.clone(),
            details,
        }
    }
}

impl FileIo for CheckedFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, VfsError> {
        let n = self.inner.read_at(buf, offset)?;
        if n > buf.len() {
            return Err(self.overrun("read", n, buf.len()));
        }
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize, VfsError> {
        let n = self.inner.write_at(buf, offset)?;
        if n > buf.len() {
            return Err(self.overrun("write", n, buf.len()));
        }
        if n < buf.len() {
            return Err(VfsError::ShortWrite {
                path: self.path.clone(),
                offset,
                written: n,
                expected: buf.len(),
            });
        }
        Ok(n)
    }

    fn truncate(&self, size: u64) -> Result<(), VfsError> {
        self.inner.truncate(size)
    }

    fn sync(&self, level: SyncLevel) -> Result<(), VfsError> {
        self.inner.sync(level)
    }

    fn file_size(&self) -> Result<u64, VfsError> {
        self.inner.file_size()
    }

    fn close(self: Box<Self>) -> Result<(), VfsError> {
        self.inner.close()
    }
}

impl FileLock for CheckedFile {
    fn lock(&self, level: LockLevel) -> Result<(), VfsError> {
        let before = self.inner.lock_level();
        let expected = before.max(level);
        match self.inner.lock(level) {
            Ok(()) => {
                let held = self.inner.lock_level();
                if held != expected {
                    return Err(self.protocol(format!(
                        "lock({level}) from {before} succeeded holding {held}"
                    )));
                }
                Ok(())
            }
            Err(VfsError::Busy { held, .. }) if held >= level => Err(self.protocol(format!(
                "lock({level}) reported busy while holding {held}"
            ))),
            Err(err) => Err(err),
        }
    }

    fn unlock(&self, level: LockLevel) -> Result<(), VfsError> {
        self.inner.unlock(level)?;
        let held = self.inner.lock_level();
        if held > level {
            return Err(self.protocol(format!("unlock({level}) left {held} held")));
        }
        Ok(())
    }

    fn check_reserved_lock(&self) -> Result<bool, VfsError> {
        self.inner.check_reserved_lock()
    }

    fn lock_level(&self) -> LockLevel {
        self.inner.lock_level()
    }
}

impl FileDevice for CheckedFile {
    fn sector_size(&self) -> u32 {
        self.inner.sector_size()
    }

    fn device_characteristics(&self) -> DeviceCharacteristics {
        DeviceCharacteristics::from_bits_truncate(self.inner.device_characteristics().bits())
    }
}
