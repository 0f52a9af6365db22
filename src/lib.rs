//! # dbvfs
//!
//! The pluggable storage backend (**VFS**) contract of an embedded relational
//! database engine, with two reference backends.
//!
//! The engine never touches the OS directly: every byte read, write, sync and
//! lock goes through a [`VfsFile`] produced by a [`Vfs`] that was registered
//! under a name and selected by a connection target such as
//! `app.db?vfs=memory`.
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust
//! use dbvfs::{LockLevel, MemoryVfs, OpenFlags, Registry, SyncLevel, VfsFileExt};
//!
//! let registry = Registry::new();
//! registry.register("memory", MemoryVfs::new()).unwrap();
//!
//! let opened = registry.open("app.db?vfs=memory", OpenFlags::main_db()).unwrap();
//! let file = opened.file;
//!
//! file.lock(LockLevel::Exclusive).unwrap();
//! file.write_all_at(&[0u8; 4096], 0).unwrap();
//! file.sync(SyncLevel::Full).unwrap();
//! file.unlock(LockLevel::None).unwrap();
//! file.close().unwrap();
//! ```
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`VfsFile`] | An open file: byte I/O, lock protocol, device properties |
//! | [`Vfs`] | Backend factory: open, delete, access, full pathname |
//! | [`Registry`] | Process-wide name → backend directory |
//! | [`LockLevel`] | The five-level lock state |
//! | [`SyncLevel`] | Durability requested from `sync` |
//! | [`DeviceCharacteristics`] | Capability bitmask a file advertises |
//! | [`VfsError`] | Error type with context and native result codes |
//!
//! ---
//!
//! ## Trait Hierarchy
//!
//! ```text
//! File:     FileIo + FileLock + FileDevice = VfsFile
//! Factory:  Vfs ──open()──▶ Box<dyn VfsFile>
//! ```
//!
//! [`VfsFile`] has a **blanket implementation**: implement the three
//! component traits and you get it for free.
//!
//! ---
//!
//! ## Locking
//!
//! Levels are totally ordered, `None < Shared < Reserved < Pending <
//! Exclusive`, and hold across every process sharing the file. Both reference
//! backends drive a [`LockMachine`] over a [`LockArbiter`]:
//!
//! - [`DirVfs`] uses [`FileArbiter`], OS advisory locks on sidecar files
//! - [`MemoryVfs`] uses [`MemoryLockTable`], an in-process table
//!
//! Contention never blocks: a refused transition fails with
//! [`VfsError::Busy`] and the engine decides whether to retry.
//!
//! ---
//!
//! ## Error Handling
//!
//! All operations return `Result<T, VfsError>`. Errors carry context and map
//! onto the engine's extended result codes:
//!
//! ```rust
//! use dbvfs::{LockLevel, VfsError};
//! use std::path::PathBuf;
//!
//! let err = VfsError::Busy {
//!     path: PathBuf::from("/data/app.db"),
//!     requested: LockLevel::Exclusive,
//!     held: LockLevel::Pending,
//! };
//! assert_eq!(
//!     err.to_string(),
//!     "database is busy: /data/app.db (requested exclusive, holding pending)"
//! );
//! assert_eq!(err.result_code(), 5);
//! ```
//!
//! ---
//!
//! ## Capability Honesty
//!
//! A backend must only advertise [`DeviceCharacteristics`] its medium really
//! provides; the engine skips journaling work based on them. This is a
//! precondition on backend authors and is not checked.
//!
//! ---
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` and methods take `&self`. Backends
//! serialize calls on one handle internally, so a handle can be shared across
//! threads behind an `Arc`.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Serialization for the value types and `BackendOptions::from_json` |

// Private modules
mod backends;
mod error;
mod ext;
mod layer;
mod lock;
mod middleware;
mod registry;
mod target;
mod traits;
mod types;

// Public re-exports - error types
pub use error::VfsError;

// Public re-exports - core types
pub use types::{AccessKind, DeviceCharacteristics, LockLevel, OpenFlags, SyncLevel};

// Public re-exports - contract traits
pub use traits::{FileDevice, FileIo, FileLock, Vfs, VfsFile};

// Public re-exports - lock protocol
pub use lock::{
    FileArbiter, LockArbiter, LockMachine, LockSlot, MemoryArbiter, MemoryLockTable, SlotMode,
    remove_lock_sidecars,
};

// Public re-exports - backends
pub use backends::{
    BackendOptions, DEFAULT_SECTOR_SIZE, DirFile, DirVfs, MemoryFile, MemoryVfs,
};

// Public re-exports - registry and targets
pub use registry::{OpenedFile, Registry, find, register};
pub use target::DatabaseTarget;

// Public re-exports - infrastructure
pub use ext::{ReadOutcome, VfsFileExt};
pub use layer::{Layer, LayerExt};
pub use middleware::{
    CheckedFile, CheckedLayer, CheckedVfs, TracedFile, TracedVfs, TracingLayer,
};
