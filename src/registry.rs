//! # Backend Registry
//!
//! Name-keyed directory of backends, consulted when a database is opened by
//! a connection target such as `app.db?vfs=memory`.
//!
//! ## Responsibility
//! - Bind names to backends, rejecting duplicates (the first binding stays)
//! - Resolve the `vfs` parameter of a target and open the file through it
//!
//! There is no unregister and no implicit default backend: a target without a
//! `vfs` parameter is rejected.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::{DatabaseTarget, OpenFlags, Vfs, VfsError, VfsFile};

/// A file opened through [`Registry::open`].
pub struct OpenedFile {
    /// The open handle.
    pub file: Box<dyn VfsFile>,
    /// The flags the backend actually granted.
    pub flags: OpenFlags,
    /// The parsed target the file was opened from.
    pub target: DatabaseTarget,
}

impl std::fmt::Debug for OpenedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedFile")
            .field("flags", &self.flags)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Name-to-backend registry.
///
/// [`Registry::global`] is the process-wide instance behind the free
/// functions [`register`] and [`find`]; [`Registry::new`] builds an isolated
/// one.
///
/// # Example
///
/// ```rust
/// use dbvfs::{MemoryVfs, OpenFlags, Registry, VfsError};
///
/// let registry = Registry::new();
/// registry.register("memory", MemoryVfs::new()).unwrap();
///
/// let err = registry.register("memory", MemoryVfs::new()).unwrap_err();
/// assert!(matches!(err, VfsError::DuplicateName { .. }));
///
/// let opened = registry.open("app.db?vfs=memory", OpenFlags::main_db()).unwrap();
/// assert!(opened.flags.is_writable());
/// opened.file.close().unwrap();
/// ```
#[derive(Default)]
pub struct Registry {
    entries: RwLock<BTreeMap<String, Arc<dyn Vfs>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names())
            .finish()
    }
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// Bind `name` to `vfs`.
    ///
    /// # Errors
    ///
    /// [`VfsError::DuplicateName`] if `name` is already bound; the existing
    /// binding is kept.
    pub fn register(&self, name: &str, vfs: impl Vfs + 'static) -> Result<(), VfsError> {
        self.register_arc(name, Arc::new(vfs))
    }

    /// Bind `name` to a shared backend.
    ///
    /// # Errors
    ///
    /// [`VfsError::DuplicateName`] if `name` is already bound.
    pub fn register_arc(&self, name: &str, vfs: Arc<dyn Vfs>) -> Result<(), VfsError> {
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            debug!(vfs = name, "duplicate registration refused");
            return Err(VfsError::DuplicateName {
                name: name.to_owned(),
            });
        }
        entries.insert(name.to_owned(), vfs);
        info!(vfs = name, "registered vfs");
        Ok(())
    }

    /// The backend bound to `name`.
    pub fn find(&self, name: &str) -> Option<Arc<dyn Vfs>> {
        self.entries.read().get(name).cloned()
    }

    /// Returns `true` if `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Bound names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Parse `target`, resolve its backend and open the file through it.
    ///
    /// # Errors
    ///
    /// - [`VfsError::InvalidTarget`] if the target is malformed or has no
    ///   `vfs` parameter
    /// - [`VfsError::UnknownVfs`] if no backend is bound to that name
    /// - any error from the backend's [`open`](Vfs::open)
    pub fn open(&self, target: &str, flags: OpenFlags) -> Result<OpenedFile, VfsError> {
        let target = DatabaseTarget::parse(target)?;
        let name = target.vfs().ok_or_else(|| VfsError::InvalidTarget {
            target: target.to_string(),
            reason: "missing vfs parameter",
        })?;
        let vfs = self.find(name).ok_or_else(|| VfsError::UnknownVfs {
            name: name.to_owned(),
        })?;
        let (file, flags) = vfs.open(Some(target.path()), flags)?;
        Ok(OpenedFile {
            file,
            flags,
            target,
        })
    }
}

/// Bind `name` in the [global](Registry::global) registry.
///
/// # Errors
///
/// [`VfsError::DuplicateName`] if `name` is already bound.
pub fn register(name: &str, vfs: impl Vfs + 'static) -> Result<(), VfsError> {
    Registry::global().register(name, vfs)
}

/// Look `name` up in the [global](Registry::global) registry.
pub fn find(name: &str) -> Option<Arc<dyn Vfs>> {
    Registry::global().find(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccessKind, MemoryVfs};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn first_registration_stays_active() {
        let registry = Registry::new();
        let first = MemoryVfs::new();
        registry.register("mem", first.clone()).unwrap();
        assert!(registry.register("mem", MemoryVfs::new()).is_err());

        let (file, _) = first.open(Some("marker"), OpenFlags::main_db()).unwrap();
        file.close().unwrap();
        let found = registry.find("mem").unwrap();
        assert!(found.access("marker", AccessKind::Exists).unwrap());
    }

    #[test]
    fn names_are_sorted() {
        let registry = Registry::new();
        registry.register("b", MemoryVfs::new()).unwrap();
        registry.register("a", MemoryVfs::new()).unwrap();
        assert_eq!(registry.names(), ["a", "b"]);
        assert!(registry.contains("a"));
        assert!(!registry.contains("c"));
        assert!(registry.find("c").is_none());
    }

    #[test]
    fn open_requires_known_vfs() {
        let registry = Registry::new();
        registry.register("mem", MemoryVfs::new()).unwrap();

        assert!(matches!(
            registry.open("db", OpenFlags::main_db()),
            Err(VfsError::InvalidTarget {
                reason: "missing vfs parameter",
                ..
            })
        ));
        assert!(matches!(
            registry.open("db?vfs=nope", OpenFlags::main_db()),
            Err(VfsError::UnknownVfs { .. })
        ));

        let opened = registry.open("file:db?vfs=mem", OpenFlags::main_db()).unwrap();
        assert_eq!(opened.target.path(), "db");
        opened.file.close().unwrap();
    }

    #[test]
    fn concurrent_registration_has_one_winner() {
        let registry = Arc::new(Registry::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry.register("contested", MemoryVfs::new()).is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(registry.names(), ["contested"]);
    }

    #[test]
    fn global_free_functions() {
        register("registry-unit-test", MemoryVfs::new()).unwrap();
        assert!(find("registry-unit-test").is_some());
        assert!(register("registry-unit-test", MemoryVfs::new()).is_err());
    }
}
