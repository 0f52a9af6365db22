//! Directory-rooted backend on the OS filesystem.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::BackendOptions;
use crate::{
    AccessKind, DeviceCharacteristics, FileArbiter, FileDevice, FileIo, FileLock, LockLevel,
    LockMachine, OpenFlags, SyncLevel, Vfs, VfsError, VfsFile, remove_lock_sidecars,
};

/// Largest offset the OS accepts; file offsets are signed.
const MAX_OFFSET: u64 = i64::MAX as u64;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Backend storing each file under a root directory.
///
/// Relative names resolve against the root; absolute names are used as
/// given. Locks are OS advisory locks on sidecar files (see
/// [`FileArbiter`]), so they are honoured by every process using `DirVfs`
/// on the same directory. Deleting a file, or closing a delete-on-close
/// handle, also removes the sidecars nobody holds.
///
/// # Durability
///
/// - [`SyncLevel::Normal`] and [`SyncLevel::Full`] call `File::sync_all`
/// - [`SyncLevel::DataOnly`] calls `File::sync_data`
///
/// # Example
///
/// ```rust
/// use dbvfs::{DirVfs, OpenFlags, Vfs, VfsFileExt};
///
/// let dir = tempfile::tempdir().unwrap();
/// let vfs = DirVfs::new(dir.path()).unwrap();
///
/// let (file, _) = vfs.open(Some("app.db"), OpenFlags::main_db()).unwrap();
/// file.write_all_at(b"hello", 0).unwrap();
/// file.close().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct DirVfs {
    root: PathBuf,
    options: BackendOptions,
}

impl DirVfs {
    /// Backend rooted at `root` with default options. Creates the root.
    ///
    /// # Errors
    ///
    /// [`VfsError::Io`] if the root cannot be created or resolved.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, VfsError> {
        Self::with_options(root, BackendOptions::default())
    }

    /// Backend rooted at `root` with `options`. Creates the root.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Config`] if `options` are invalid
    /// - [`VfsError::Io`] if the root cannot be created or resolved
    pub fn with_options(root: impl AsRef<Path>, options: BackendOptions) -> Result<Self, VfsError> {
        options.validate()?;
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|e| VfsError::io("open", root, e))?;
        let root = fs::canonicalize(root).map_err(|e| VfsError::io("open", root, e))?;
        debug!(root = %root.display(), "dir vfs ready");
        Ok(Self { root, options })
    }

    /// The canonical root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The options handed to every file this backend opens.
    #[must_use]
    pub fn options(&self) -> &BackendOptions {
        &self.options
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn temp_path(&self) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!("dbvfs-temp-{}-{n}", std::process::id()))
    }
}

fn open_error(path: &Path, err: io::Error) -> VfsError {
    match err.kind() {
        io::ErrorKind::NotFound => VfsError::NotFound {
            path: path.to_path_buf(),
        },
        io::ErrorKind::AlreadyExists => VfsError::AlreadyExists {
            path: path.to_path_buf(),
            operation: "open",
        },
        _ => VfsError::io("open", path, err),
    }
}

impl Vfs for DirVfs {
    fn open(
        &self,
        name: Option<&str>,
        flags: OpenFlags,
    ) -> Result<(Box<dyn VfsFile>, OpenFlags), VfsError> {
        let (path, mut flags) = match name {
            Some(name) => (self.resolve(name), flags),
            None => (
                self.temp_path(),
                flags | OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::DELETE_ON_CLOSE,
            ),
        };

        let writable = flags.is_writable();
        let mut options = OpenOptions::new();
        options.read(true).write(writable);
        if writable && flags.contains(OpenFlags::CREATE) {
            if flags.contains(OpenFlags::EXCLUSIVE) {
                options.create_new(true);
            } else {
                options.create(true);
            }
        }

        let file = match options.open(&path) {
            Ok(file) => file,
            // Fall back to read-only, as the engine expects for files it may
            // not write.
            Err(err) if writable && err.kind() == io::ErrorKind::PermissionDenied => {
                let file = OpenOptions::new()
                    .read(true)
                    .open(&path)
                    .map_err(|e| open_error(&path, e))?;
                flags.remove(OpenFlags::READ_WRITE);
                flags.insert(OpenFlags::READ_ONLY);
                file
            }
            Err(err) => return Err(open_error(&path, err)),
        };

        debug!(path = %path.display(), flags = ?flags, "opened file");
        let handle = DirFile {
            lock: Mutex::new(LockMachine::new(&path, FileArbiter::new(&path))),
            file: Mutex::new(file),
            delete_on_close: flags.contains(OpenFlags::DELETE_ON_CLOSE),
            flags,
            options: self.options,
            path,
        };
        Ok((Box::new(handle), flags))
    }

    fn delete(&self, name: &str, sync_dir: bool) -> Result<(), VfsError> {
        let path = self.resolve(name);
        fs::remove_file(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound { path: path.clone() },
            _ => VfsError::io("delete", &path, e),
        })?;
        clear_sidecars(&path);
        if sync_dir {
            sync_parent(&path)?;
        }
        debug!(path = %path.display(), "deleted file");
        Ok(())
    }

    fn access(&self, name: &str, kind: AccessKind) -> Result<bool, VfsError> {
        let path = self.resolve(name);
        match fs::metadata(&path) {
            Ok(meta) => Ok(match kind {
                AccessKind::Exists | AccessKind::Read => meta.is_file(),
                AccessKind::ReadWrite => meta.is_file() && !meta.permissions().readonly(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(VfsError::io("access", &path, e)),
        }
    }

    fn full_pathname(&self, name: &str) -> Result<String, VfsError> {
        Ok(self.resolve(name).to_string_lossy().into_owned())
    }
}

/// Lock sidecars are housekeeping; failing to remove them never fails the
/// delete.
fn clear_sidecars(path: &Path) {
    match remove_lock_sidecars(path) {
        Ok(0) => {}
        Ok(removed) => debug!(path = %path.display(), removed, "removed lock sidecars"),
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove lock sidecars"),
    }
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> Result<(), VfsError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    File::open(parent)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| VfsError::io("delete", parent, e))
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> Result<(), VfsError> {
    Ok(())
}

/// A file opened by [`DirVfs`].
#[derive(Debug)]
pub struct DirFile {
    path: PathBuf,
    file: Mutex<File>,
    lock: Mutex<LockMachine<FileArbiter>>,
    flags: OpenFlags,
    options: BackendOptions,
    delete_on_close: bool,
}

impl DirFile {
    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
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

    fn remove_if_temporary(&mut self) -> Result<(), VfsError> {
        if !self.delete_on_close {
            return Ok(());
        }
        self.delete_on_close = false;
        // Our own holds would keep the sidecars alive.
        self.lock.get_mut().unlock(LockLevel::None)?;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(VfsError::io("close", &self.path, e)),
        }
        clear_sidecars(&self.path);
        Ok(())
    }
}

impl FileIo for DirFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, VfsError> {
        if offset > MAX_OFFSET {
            return Ok(0);
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| VfsError::io("read", &self.path, e))?;

        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(VfsError::io("read", &self.path, e)),
            }
        }
        Ok(filled)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize, VfsError> {
        self.check_writable("write")?;
        if offset.saturating_add(buf.len() as u64) > MAX_OFFSET {
            return Err(VfsError::io(
                "write",
                &self.path,
                io::Error::new(io::ErrorKind::InvalidInput, "write ends past the largest offset"),
            ));
        }
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| VfsError::io("write", &self.path, e))?;

        let short = |written: usize| VfsError::ShortWrite {
            path: self.path.clone(),
            offset,
            written,
            expected: buf.len(),
        };
        let mut written = 0;
        while written < buf.len() {
            match file.write(&buf[written..]) {
                Ok(0) => return Err(short(written)),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if written > 0 => {
                    warn!(path = %self.path.display(), error = %e, written, "write stopped early");
                    return Err(short(written));
                }
                Err(e) => return Err(VfsError::io("write", &self.path, e)),
            }
        }
        Ok(written)
    }

    fn truncate(&self, size: u64) -> Result<(), VfsError> {
        self.check_writable("truncate")?;
        if size > MAX_OFFSET {
            return Err(VfsError::io(
                "truncate",
                &self.path,
                io::Error::new(io::ErrorKind::InvalidInput, "size past the largest offset"),
            ));
        }
        self.file
            .lock()
            .set_len(size)
            .map_err(|e| VfsError::io("truncate", &self.path, e))
    }

    fn sync(&self, level: SyncLevel) -> Result<(), VfsError> {
        let file = self.file.lock();
        let result = match level {
            SyncLevel::Normal | SyncLevel::Full => file.sync_all(),
            SyncLevel::DataOnly => file.sync_data(),
        };
        result.map_err(|e| VfsError::io("sync", &self.path, e))
    }

    fn file_size(&self) -> Result<u64, VfsError> {
        self.file
            .lock()
            .metadata()
            .map(|meta| meta.len())
            .map_err(|e| VfsError::io("file_size", &self.path, e))
    }

    fn close(self: Box<Self>) -> Result<(), VfsError> {
        let mut this = *self;
        let unlocked = this.lock.get_mut().unlock(LockLevel::None);
        let removed = this.remove_if_temporary();
        debug!(path = %this.path.display(), "closed file");
        unlocked?;
        removed
    }
}

impl FileLock for DirFile {
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

impl FileDevice for DirFile {
    fn sector_size(&self) -> u32 {
        self.options.sector_size
    }

    fn device_characteristics(&self) -> DeviceCharacteristics {
        self.options.characteristics
    }
}

impl Drop for DirFile {
    fn drop(&mut self) {
        if let Err(err) = self.remove_if_temporary() {
            warn!(path = %self.path.display(), error = %err, "failed to remove temporary file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn vfs() -> (tempfile::TempDir, DirVfs) {
        let dir = tempdir().unwrap();
        let vfs = DirVfs::new(dir.path()).unwrap();
        (dir, vfs)
    }

    #[test]
    fn open_missing_without_create_fails() {
        let (_dir, vfs) = vfs();
        let result = vfs.open(Some("missing.db"), OpenFlags::READ_WRITE);
        assert!(matches!(result, Err(VfsError::NotFound { .. })));
    }

    #[test]
    fn exclusive_create_refuses_existing() {
        let (_dir, vfs) = vfs();
        let (file, _) = vfs.open(Some("a.db"), OpenFlags::main_db()).unwrap();
        file.close().unwrap();

        let flags = OpenFlags::main_db() | OpenFlags::EXCLUSIVE;
        let result = vfs.open(Some("a.db"), flags);
        assert!(matches!(result, Err(VfsError::AlreadyExists { .. })));
    }

    #[test]
    fn short_read_past_end() {
        let (_dir, vfs) = vfs();
        let (file, _) = vfs.open(Some("a.db"), OpenFlags::main_db()).unwrap();
        file.write_at(b"hello", 0).unwrap();

        let mut buf = [0xffu8; 8];
        assert_eq!(file.read_at(&mut buf, 2).unwrap(), 3);
        assert_eq!(&buf[..3], b"llo");
        // The backend leaves the tail alone; padding is the caller's job.
        assert_eq!(&buf[3..], &[0xff; 5]);
        assert_eq!(file.read_at(&mut buf, 100).unwrap(), 0);
    }

    #[test]
    fn write_past_end_extends_with_zeros() {
        let (_dir, vfs) = vfs();
        let (file, _) = vfs.open(Some("a.db"), OpenFlags::main_db()).unwrap();
        file.write_at(b"xy", 6).unwrap();
        assert_eq!(file.file_size().unwrap(), 8);

        let mut buf = [1u8; 8];
        assert_eq!(file.read_at(&mut buf, 0).unwrap(), 8);
        assert_eq!(&buf, b"\0\0\0\0\0\0xy");
    }

    #[test]
    fn truncate_shrinks_and_extends() {
        let (_dir, vfs) = vfs();
        let (file, _) = vfs.open(Some("a.db"), OpenFlags::main_db()).unwrap();
        file.write_at(b"abcdef", 0).unwrap();
        file.truncate(3).unwrap();
        assert_eq!(file.file_size().unwrap(), 3);
        file.truncate(5).unwrap();

        let mut buf = [9u8; 5];
        file.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf, b"abc\0\0");
    }

    #[test]
    fn sync_levels_succeed() {
        let (_dir, vfs) = vfs();
        let (file, _) = vfs.open(Some("a.db"), OpenFlags::main_db()).unwrap();
        file.write_at(b"data", 0).unwrap();
        for level in [SyncLevel::Normal, SyncLevel::Full, SyncLevel::DataOnly] {
            file.sync(level).unwrap();
        }
    }

    #[test]
    fn read_only_handle_rejects_writes() {
        let (_dir, vfs) = vfs();
        let (file, _) = vfs.open(Some("a.db"), OpenFlags::main_db()).unwrap();
        file.close().unwrap();

        let (file, granted) = vfs.open(Some("a.db"), OpenFlags::READ_ONLY).unwrap();
        assert!(!granted.is_writable());
        assert!(matches!(
            file.write_at(b"x", 0),
            Err(VfsError::ReadOnly { .. })
        ));
        assert!(matches!(file.truncate(0), Err(VfsError::ReadOnly { .. })));
    }

    #[test]
    fn anonymous_file_is_deleted_on_close() {
        let (dir, vfs) = vfs();
        let (file, granted) = vfs.open(None, OpenFlags::TEMP_JOURNAL).unwrap();
        assert!(granted.contains(OpenFlags::DELETE_ON_CLOSE));
        file.write_at(b"scratch", 0).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        file.close().unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn locked_temporary_leaves_nothing_behind() {
        let (dir, vfs) = vfs();
        let (file, _) = vfs.open(None, OpenFlags::TEMP_JOURNAL).unwrap();
        file.lock(LockLevel::Exclusive).unwrap();
        file.write_at(b"scratch", 0).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 4);

        file.close().unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn dropped_locked_temporary_leaves_nothing_behind() {
        let (dir, vfs) = vfs();
        let flags = OpenFlags::main_db() | OpenFlags::DELETE_ON_CLOSE;
        let (file, _) = vfs.open(Some("t.db"), flags).unwrap();
        file.lock(LockLevel::Reserved).unwrap();
        drop(file);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn delete_removes_idle_sidecars() {
        let (dir, vfs) = vfs();
        let (file, _) = vfs.open(Some("a.db"), OpenFlags::main_db()).unwrap();
        file.lock(LockLevel::Exclusive).unwrap();
        file.close().unwrap();
        assert!(dir.path().join("a.db-shared.lock").exists());

        vfs.delete("a.db", false).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn delete_keeps_sidecars_still_held() {
        let (dir, vfs) = vfs();
        let (reader, _) = vfs.open(Some("a.db"), OpenFlags::main_db()).unwrap();
        reader.lock(LockLevel::Shared).unwrap();

        vfs.delete("a.db", false).unwrap();
        assert!(!dir.path().join("a.db").exists());
        assert!(dir.path().join("a.db-shared.lock").exists());
        assert!(!dir.path().join("a.db-pending.lock").exists());
    }

    #[test]
    fn huge_offsets_are_errors_or_past_end() {
        let (_dir, vfs) = vfs();
        let (file, _) = vfs.open(Some("a.db"), OpenFlags::main_db()).unwrap();
        file.write_at(b"keep", 0).unwrap();

        let err = file.write_at(b"x", u64::MAX - 10).unwrap_err();
        assert!(matches!(err, VfsError::Io { operation: "write", .. }));
        assert!(file.write_at(b"x", u64::MAX).is_err());
        assert!(matches!(
            file.truncate(u64::MAX),
            Err(VfsError::Io { operation: "truncate", .. })
        ));

        let mut buf = [0u8; 4];
        assert_eq!(file.read_at(&mut buf, u64::MAX - 1).unwrap(), 0);
        assert_eq!(file.file_size().unwrap(), 4);
    }

    #[test]
    fn dropped_temporary_is_deleted() {
        let (dir, vfs) = vfs();
        let flags = OpenFlags::main_db() | OpenFlags::DELETE_ON_CLOSE;
        let (file, _) = vfs.open(Some("t.db"), flags).unwrap();
        drop(file);
        assert!(!dir.path().join("t.db").exists());
    }

    #[test]
    fn delete_and_access() {
        let (_dir, vfs) = vfs();
        assert!(!vfs.access("a.db", AccessKind::Exists).unwrap());

        let (file, _) = vfs.open(Some("a.db"), OpenFlags::main_db()).unwrap();
        file.close().unwrap();
        assert!(vfs.access("a.db", AccessKind::Exists).unwrap());
        assert!(vfs.access("a.db", AccessKind::Read).unwrap());
        assert!(vfs.access("a.db", AccessKind::ReadWrite).unwrap());

        vfs.delete("a.db", true).unwrap();
        assert!(!vfs.access("a.db", AccessKind::Exists).unwrap());
        assert!(matches!(
            vfs.delete("a.db", false),
            Err(VfsError::NotFound { .. })
        ));
    }

    #[test]
    fn full_pathname_is_rooted() {
        let (_dir, vfs) = vfs();
        let full = vfs.full_pathname("a.db").unwrap();
        assert_eq!(PathBuf::from(&full), vfs.root().join("a.db"));
    }

    #[test]
    fn reports_configured_device() {
        let dir = tempdir().unwrap();
        let options = BackendOptions::default()
            .with_sector_size(512)
            .with_characteristics(DeviceCharacteristics::SAFE_APPEND);
        let vfs = DirVfs::with_options(dir.path(), options).unwrap();
        let (file, _) = vfs.open(Some("a.db"), OpenFlags::main_db()).unwrap();
        assert_eq!(file.sector_size(), 512);
        assert_eq!(
            file.device_characteristics(),
            DeviceCharacteristics::SAFE_APPEND
        );
    }

    #[test]
    fn invalid_options_are_rejected() {
        let dir = tempdir().unwrap();
        let options = BackendOptions::default().with_sector_size(3);
        assert!(matches!(
            DirVfs::with_options(dir.path(), options),
            Err(VfsError::Config(_))
        ));
    }

    #[test]
    fn close_releases_lock() {
        let (_dir, vfs) = vfs();
        let (a, _) = vfs.open(Some("a.db"), OpenFlags::main_db()).unwrap();
        let (b, _) = vfs.open(Some("a.db"), OpenFlags::main_db()).unwrap();
        a.lock(LockLevel::Exclusive).unwrap();
        assert!(b.lock(LockLevel::Shared).unwrap_err().is_busy());

        a.close().unwrap();
        b.lock(LockLevel::Exclusive).unwrap();
    }
}
