//! In-memory backend.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::BackendOptions;
use crate::{
    AccessKind, DeviceCharacteristics, FileDevice, FileIo, FileLock, LockLevel, LockMachine,
    MemoryArbiter, MemoryLockTable, OpenFlags, SyncLevel, Vfs, VfsError, VfsFile,
};

type Contents = Arc<RwLock<Vec<u8>>>;

#[derive(Debug, Default)]
struct Store {
    files: Mutex<HashMap<String, Contents>>,
    next_temp: AtomicU64,
}

/// Backend keeping every file in process memory.
///
/// Names are plain keys with no directory structure. Clones share the same
/// files and the same lock table, so every handle opened through any clone
/// contends with the others. Nothing survives the last clone.
///
/// `sync` is a no-op: there is no medium to flush to.
///
/// # Example
///
/// ```rust
/// use dbvfs::{MemoryVfs, OpenFlags, Vfs, VfsFileExt};
///
/// let vfs = MemoryVfs::new();
/// let (file, _) = vfs.open(Some("app.db"), OpenFlags::main_db()).unwrap();
/// file.write_all_at(b"hello", 0).unwrap();
/// assert_eq!(file.file_size().unwrap(), 5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryVfs {
    store: Arc<Store>,
    locks: MemoryLockTable,
    options: BackendOptions,
}

impl MemoryVfs {
    /// An empty backend with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty backend with `options`.
    ///
    /// # Errors
    ///
    /// [`VfsError::Config`] if `options` are invalid.
    pub fn with_options(options: BackendOptions) -> Result<Self, VfsError> {
        options.validate()?;
        Ok(Self {
            options,
            ..Self::default()
        })
    }

    /// The lock table shared by this backend's handles.
    #[must_use]
    pub fn lock_table(&self) -> &MemoryLockTable {
        &self.locks
    }

    /// Names of the files currently stored, sorted.
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.store.files.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Vfs for MemoryVfs {
    fn open(
        &self,
        name: Option<&str>,
        flags: OpenFlags,
    ) -> Result<(Box<dyn VfsFile>, OpenFlags), VfsError> {
        let (name, flags) = match name {
            Some(name) => (name.to_owned(), flags),
            None => {
                let n = self.store.next_temp.fetch_add(1, Ordering::Relaxed);
                (
                    format!("temp-{n}"),
                    flags | OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::DELETE_ON_CLOSE,
                )
            }
        };

        let contents = {
            let mut files = self.store.files.lock();
            let creating = flags.is_writable() && flags.contains(OpenFlags::CREATE);
            match files.get(&name) {
                Some(_) if creating && flags.contains(OpenFlags::EXCLUSIVE) => {
                    return Err(VfsError::AlreadyExists {
                        path: PathBuf::from(&name),
                        operation: "open",
                    });
                }
                Some(contents) => Arc::clone(contents),
                None if creating => {
                    let contents = Contents::default();
                    files.insert(name.clone(), Arc::clone(&contents));
                    contents
                }
                None => {
                    return Err(VfsError::NotFound {
                        path: PathBuf::from(&name),
                    });
                }
            }
        };

        debug!(file = %name, flags = ?flags, "opened memory file");
        let handle = MemoryFile {
            lock: Mutex::new(LockMachine::new(&name, self.locks.arbiter(&name))),
            path: PathBuf::from(&name),
            contents,
            store: Arc::clone(&self.store),
            delete_on_close: flags.contains(OpenFlags::DELETE_ON_CLOSE),
            flags,
            options: self.options,
            name,
        };
        Ok((Box::new(handle), flags))
    }

    fn delete(&self, name: &str, _sync_dir: bool) -> Result<(), VfsError> {
        match self.store.files.lock().remove(name) {
            Some(_) => {
                debug!(file = %name, "deleted memory file");
                Ok(())
            }
            None => Err(VfsError::NotFound {
                path: PathBuf::from(name),
            }),
        }
    }

    fn access(&self, name: &str, _kind: AccessKind) -> Result<bool, VfsError> {
        Ok(self.store.files.lock().contains_key(name))
    }

    fn full_pathname(&self, name: &str) -> Result<String, VfsError> {
        Ok(name.to_owned())
    }
}

/// A file opened by [`MemoryVfs`].
///
/// Handles to the same name share contents; a deleted file stays readable
/// through handles that were already open.
#[derive(Debug)]
pub struct MemoryFile {
    name: String,
    path: PathBuf,
    contents: Contents,
    store: Arc<Store>,
    lock: Mutex<LockMachine<MemoryArbiter>>,
    flags: OpenFlags,
    options: BackendOptions,
    delete_on_close: bool,
}

impl MemoryFile {
    /// The name this file was opened under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn check_writable(&self, operation: &'static str) -> Result<(), VfsError> {
        if self.flags.is_writable() {
            Ok(())
        } else {
            Err(VfsError::ReadOnly {
                path: self.path.clone(),
                operation,
            })
        }
    }

    fn remove_if_temporary(&mut self) {
        if !self.delete_on_close {
            return;
        }
        self.delete_on_close = false;
        let mut files = self.store.files.lock();
        // Only remove the entry if it still refers to our contents.
        let ours = files
            .get(&self.name)
            .is_some_and(|current| Arc::ptr_eq(current, &self.contents));
        if ours {
            files.remove(&self.name);
        }
    }
}

/// Largest size a memory file may reach; the OS backend's limit as well.
const MAX_FILE_SIZE: u64 = i64::MAX as u64;

fn offset_to_index(offset: u64) -> usize {
    usize::try_from(offset).unwrap_or(usize::MAX)
}

/// Resize `data` to `size` bytes without panicking or aborting when the
/// size cannot be allocated.
fn resize_contents(data: &mut Vec<u8>, size: u64) -> io::Result<()> {
    let size = usize::try_from(size)
        .ok()
        .filter(|_| size <= MAX_FILE_SIZE)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("file size {size} out of range"),
            )
        })?;
    if size > data.len() {
        data.try_reserve_exact(size - data.len())
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
    }
    data.resize(size, 0);
    Ok(())
}

impl FileIo for MemoryFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, VfsError> {
        let data = self.contents.read();
        let start = offset_to_index(offset);
        if start >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize, VfsError> {
        self.check_writable("write")?;
        let end = offset.checked_add(buf.len() as u64).ok_or_else(|| {
            VfsError::io(
                "write",
                &self.path,
                io::Error::new(io::ErrorKind::InvalidInput, "write ends past the largest offset"),
            )
        })?;

        let mut data = self.contents.write();
        if (data.len() as u64) < end {
            resize_contents(&mut data, end).map_err(|e| VfsError::io("write", &self.path, e))?;
        }
        // `end` fits in memory now, so it fits in a usize.
        let end = offset_to_index(end);
        data[end - buf.len()..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn truncate(&self, size: u64) -> Result<(), VfsError> {
        self.check_writable("truncate")?;
        resize_contents(&mut self.contents.write(), size)
            .map_err(|e| VfsError::io("truncate", &self.path, e))
    }

    fn sync(&self, _level: SyncLevel) -> Result<(), VfsError> {
        Ok(())
    }

    fn file_size(&self) -> Result<u64, VfsError> {
        Ok(self.contents.read().len() as u64)
    }

    fn close(self: Box<Self>) -> Result<(), VfsError> {
        let mut this = *self;
        let unlocked = this.lock.get_mut().unlock(LockLevel::None);
        this.remove_if_temporary();
        debug!(file = %this.name, "closed memory file");
        unlocked
    }
}

impl FileLock for MemoryFile {
    fn lock(&self, level: LockLevel) -> Result<(), VfsError> {
        self.lock.lock().lock(level)
    }

    fn unlock(&self, level: LockLevel) -> Result<(), VfsError> {
        self.lock.lock().unlock(level)
    }

    fn check_reserved_lock(&self) -> Result<bool, VfsError> {
        self.lock.lock().check_reserved_lock()
    }

    fn lock_level(&self) -> LockLevel {
        self.lock.lock().level()
    }
}

impl FileDevice for MemoryFile {
    fn sector_size(&self) -> u32 {
        self.options.sector_size
    }

    fn device_characteristics(&self) -> DeviceCharacteristics {
        self.options.characteristics
    }
}

impl Drop for MemoryFile {
    fn drop(&mut self) {
        self.remove_if_temporary();
    }
}
