//! # Backend Traits
//!
//! The trait hierarchy that defines the storage contract.
//!
//! ## Trait Layers
//!
//! A backend file implements three component traits and gets the composite
//! [`VfsFile`] for free; the factory that produces files implements [`Vfs`]:
//!
//! ```text
//! File:     FileIo + FileLock + FileDevice = VfsFile
//!                                               ↑ produced by
//! Factory:  Vfs  (open / delete / access / full_pathname)
//! ```
//!
//! ## Quick Reference
//!
//! | Trait | Methods | Concern |
//! |-------|---------|---------|
//! | [`FileIo`] | `read_at`, `write_at`, `truncate`, `sync`, `file_size`, `close` | Bytes and durability |
//! | [`FileLock`] | `lock`, `unlock`, `check_reserved_lock`, `lock_level` | Lock protocol |
//! | [`FileDevice`] | `sector_size`, `device_characteristics` | Static medium properties |
//! | [`VfsFile`] | all of the above | What the engine holds per connection |
//! | [`Vfs`] | `open`, `delete`, `access`, `full_pathname` | What the registry stores |
//!
//! ## Blanket Implementation
//!
//! ```rust
//! use dbvfs::{
//!     DeviceCharacteristics, FileDevice, FileIo, FileLock, LockLevel, SyncLevel, VfsError,
//!     VfsFile,
//! };
//!
//! struct NullFile;
//!
//! # impl FileIo for NullFile {
//! #     fn read_at(&self, _: &mut [u8], _: u64) -> Result<usize, VfsError> { Ok(0) }
//! #     fn write_at(&self, buf: &[u8], _: u64) -> Result<usize, VfsError> { Ok(buf.len()) }
//! #     fn truncate(&self, _: u64) -> Result<(), VfsError> { Ok(()) }
//! #     fn sync(&self, _: SyncLevel) -> Result<(), VfsError> { Ok(()) }
//! #     fn file_size(&self) -> Result<u64, VfsError> { Ok(0) }
//! #     fn close(self: Box<Self>) -> Result<(), VfsError> { Ok(()) }
//! # }
//! # impl FileLock for NullFile {
//! #     fn lock(&self, _: LockLevel) -> Result<(), VfsError> { Ok(()) }
//! #     fn unlock(&self, _: LockLevel) -> Result<(), VfsError> { Ok(()) }
//! #     fn check_reserved_lock(&self) -> Result<bool, VfsError> { Ok(false) }
//! #     fn lock_level(&self) -> LockLevel { LockLevel::None }
//! # }
//! # impl FileDevice for NullFile {
//! #     fn sector_size(&self) -> u32 { 4096 }
//! #     fn device_characteristics(&self) -> DeviceCharacteristics { DeviceCharacteristics::empty() }
//! # }
//! // NullFile now implements VfsFile
//! fn hold(_file: Box<dyn VfsFile>) {}
//! hold(Box::new(NullFile));
//! ```
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`. Methods take `&self`; backends use
//! interior mutability and serialize calls on one handle.

mod file_device;
mod file_io;
mod file_lock;
mod vfs;

pub use file_device::FileDevice;
pub use file_io::FileIo;
pub use file_lock::FileLock;
pub use vfs::Vfs;

/// An open backend file, as held by an engine connection.
///
/// Combines byte I/O ([`FileIo`]), the lock protocol ([`FileLock`]), and
/// medium properties ([`FileDevice`]).
///
/// # Blanket Implementation
///
/// Automatically implemented for any type that implements all three
/// component traits. You never implement `VfsFile` directly.
///
/// # Example
///
/// ```rust
/// use dbvfs::{LockLevel, SyncLevel, VfsError, VfsFile, VfsFileExt};
///
/// // A minimal commit: lock, write, sync, unlock
/// fn commit_page(file: &dyn VfsFile, page: &[u8], offset: u64) -> Result<(), VfsError> {
///     file.lock(LockLevel::Exclusive)?;
///     file.write_all_at(page, offset)?;
///     file.sync(SyncLevel::Full)?;
///     file.unlock(LockLevel::None)
/// }
/// ```
pub trait VfsFile: FileIo + FileLock + FileDevice {}

impl<T: FileIo + FileLock + FileDevice> VfsFile for T {}
