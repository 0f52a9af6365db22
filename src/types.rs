//! Core types for the dbvfs storage contract.
//!
//! Every type here crosses into a native engine as a raw integer, so the
//! numeric values are part of the contract. Each type offers `as_raw` and a
//! checked `from_raw` for that boundary.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Sub};

use crate::VfsError;

/// Lock level held on a byte store.
///
/// Levels are totally ordered: `None < Shared < Reserved < Pending < Exclusive`.
/// A level is a claim visible to every process sharing the store, not just to
/// the handle that holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum LockLevel {
    /// No lock held.
    #[default]
    None = 0,
    /// Any number of readers.
    Shared = 1,
    /// A single writer-to-be, coexisting with readers.
    Reserved = 2,
    /// A writer waiting for readers to drain; no new readers admitted.
    Pending = 3,
    /// A single writer with no other holder of any level.
    Exclusive = 4,
}

impl LockLevel {
    /// All levels in ascending order.
    pub const ALL: [LockLevel; 5] = [
        LockLevel::None,
        LockLevel::Shared,
        LockLevel::Reserved,
        LockLevel::Pending,
        LockLevel::Exclusive,
    ];

    /// Native integer value.
    #[inline]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    /// Decode a native integer value.
    ///
    /// # Errors
    ///
    /// [`VfsError::InvalidValue`] for anything outside `0..=4`.
    pub fn from_raw(raw: i32) -> Result<Self, VfsError> {
        match raw {
            0 => Ok(LockLevel::None),
            1 => Ok(LockLevel::Shared),
            2 => Ok(LockLevel::Reserved),
            3 => Ok(LockLevel::Pending),
            4 => Ok(LockLevel::Exclusive),
            _ => Err(VfsError::InvalidValue {
                kind: "lock level",
                value: i64::from(raw),
            }),
        }
    }

    /// The next level up, or `None` at `Exclusive`.
    #[inline]
    pub const fn next(self) -> Option<Self> {
        match self {
            LockLevel::None => Some(LockLevel::Shared),
            LockLevel::Shared => Some(LockLevel::Reserved),
            LockLevel::Reserved => Some(LockLevel::Pending),
            LockLevel::Pending => Some(LockLevel::Exclusive),
            LockLevel::Exclusive => None,
        }
    }

    /// The next level down, or `None` at `None`.
    #[inline]
    pub const fn prev(self) -> Option<Self> {
        match self {
            LockLevel::None => None,
            LockLevel::Shared => Some(LockLevel::None),
            LockLevel::Reserved => Some(LockLevel::Shared),
            LockLevel::Pending => Some(LockLevel::Reserved),
            LockLevel::Exclusive => Some(LockLevel::Pending),
        }
    }

    /// Returns `true` for the writer levels (Reserved and above).
    #[inline]
    pub const fn is_write_intent(self) -> bool {
        self.as_raw() >= LockLevel::Reserved.as_raw()
    }
}

impl fmt::Display for LockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockLevel::None => "none",
            LockLevel::Shared => "shared",
            LockLevel::Reserved => "reserved",
            LockLevel::Pending => "pending",
            LockLevel::Exclusive => "exclusive",
        };
        f.write_str(name)
    }
}

/// Durability requested by a `sync` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum SyncLevel {
    /// Recoverable after an ordinary crash.
    #[default]
    Normal = 0x00002,
    /// Data and ordering durable against power loss.
    Full = 0x00003,
    /// File content durable; metadata may lag.
    DataOnly = 0x00010,
}

impl SyncLevel {
    /// Native integer value.
    #[inline]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    /// Decode a native sync flag word.
    ///
    /// The engine ORs `DataOnly` onto `Normal` or `Full`; the strongest
    /// request wins, so any word carrying the `Full` bits decodes to `Full`.
    ///
    /// # Errors
    ///
    /// [`VfsError::InvalidValue`] for words with unknown bits or no level.
    pub fn from_raw(raw: i32) -> Result<Self, VfsError> {
        let invalid = || VfsError::InvalidValue {
            kind: "sync level",
            value: i64::from(raw),
        };
        if raw & !0x13 != 0 {
            return Err(invalid());
        }
        match (raw & 0x0f, raw & 0x10 != 0) {
            (0x03, _) => Ok(SyncLevel::Full),
            (0x02, false) => Ok(SyncLevel::Normal),
            (0x02, true) | (0x00, true) => Ok(SyncLevel::DataOnly),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for SyncLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncLevel::Normal => "normal",
            SyncLevel::Full => "full",
            SyncLevel::DataOnly => "data-only",
        };
        f.write_str(name)
    }
}

/// Operator impls shared by the bit-set newtypes below.
macro_rules! flag_set_ops {
    ($name:ident) => {
        impl BitOr for $name {
            type Output = Self;
            #[inline]
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            #[inline]
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;
            #[inline]
            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl Sub for $name {
            type Output = Self;
            #[inline]
            fn sub(self, rhs: Self) -> Self {
                Self(self.0 & !rhs.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(", stringify!($name))?;
                let mut first = true;
                for (name, _) in self.iter_names() {
                    if !first {
                        f.write_str(" | ")?;
                    }
                    f.write_str(name)?;
                    first = false;
                }
                if first {
                    f.write_str("empty")?;
                }
                f.write_str(")")
            }
        }
    };
}

/// Device characteristics a backend advertises for a handle.
///
/// The engine skips safety measures (journal writes, sector padding) based on
/// these flags, so a backend must never advertise behaviour it does not
/// provide. That honesty is the backend author's responsibility; nothing in
/// this crate can verify it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceCharacteristics(u32);

impl DeviceCharacteristics {
    /// Writes of any size are atomic.
    pub const ATOMIC: Self = Self(0x0000_0001);
    /// Aligned 512-byte writes are atomic.
    pub const ATOMIC_512: Self = Self(0x0000_0002);
    /// Aligned 1 KiB writes are atomic.
    pub const ATOMIC_1K: Self = Self(0x0000_0004);
    /// Aligned 2 KiB writes are atomic.
    pub const ATOMIC_2K: Self = Self(0x0000_0008);
    /// Aligned 4 KiB writes are atomic.
    pub const ATOMIC_4K: Self = Self(0x0000_0010);
    /// Aligned 8 KiB writes are atomic.
    pub const ATOMIC_8K: Self = Self(0x0000_0020);
    /// Aligned 16 KiB writes are atomic.
    pub const ATOMIC_16K: Self = Self(0x0000_0040);
    /// Aligned 32 KiB writes are atomic.
    pub const ATOMIC_32K: Self = Self(0x0000_0080);
    /// Aligned 64 KiB writes are atomic.
    pub const ATOMIC_64K: Self = Self(0x0000_0100);
    /// Appended data is written before the file size grows.
    pub const SAFE_APPEND: Self = Self(0x0000_0200);
    /// Writes reach the medium in the order issued.
    pub const SEQUENTIAL: Self = Self(0x0000_0400);
    /// The file cannot be deleted while open.
    pub const UNDELETABLE_WHEN_OPEN: Self = Self(0x0000_0800);
    /// Overwriting a sector never damages neighbouring bytes on power loss.
    pub const POWERSAFE_OVERWRITE: Self = Self(0x0000_1000);
    /// The file never changes while open.
    pub const IMMUTABLE: Self = Self(0x0000_2000);
    /// Groups of writes can be committed atomically.
    pub const BATCH_ATOMIC: Self = Self(0x0000_4000);

    const NAMED: [(&'static str, Self); 15] = [
        ("ATOMIC", Self::ATOMIC),
        ("ATOMIC_512", Self::ATOMIC_512),
        ("ATOMIC_1K", Self::ATOMIC_1K),
        ("ATOMIC_2K", Self::ATOMIC_2K),
        ("ATOMIC_4K", Self::ATOMIC_4K),
        ("ATOMIC_8K", Self::ATOMIC_8K),
        ("ATOMIC_16K", Self::ATOMIC_16K),
        ("ATOMIC_32K", Self::ATOMIC_32K),
        ("ATOMIC_64K", Self::ATOMIC_64K),
        ("SAFE_APPEND", Self::SAFE_APPEND),
        ("SEQUENTIAL", Self::SEQUENTIAL),
        ("UNDELETABLE_WHEN_OPEN", Self::UNDELETABLE_WHEN_OPEN),
        ("POWERSAFE_OVERWRITE", Self::POWERSAFE_OVERWRITE),
        ("IMMUTABLE", Self::IMMUTABLE),
        ("BATCH_ATOMIC", Self::BATCH_ATOMIC),
    ];

    const ALL_BITS: u32 = 0x0000_7fff;

    /// No characteristics.
    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every defined characteristic.
    #[inline]
    pub const fn all() -> Self {
        Self(Self::ALL_BITS)
    }

    /// Raw bitmask.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Build from a raw bitmask, rejecting undefined bits.
    ///
    /// # Errors
    ///
    /// [`VfsError::InvalidValue`] if any bit outside the defined set is set.
    pub fn from_bits(bits: u32) -> Result<Self, VfsError> {
        if bits & !Self::ALL_BITS != 0 {
            return Err(VfsError::InvalidValue {
                kind: "device characteristics",
                value: i64::from(bits),
            });
        }
        Ok(Self(bits))
    }

    /// Build from a raw bitmask, dropping undefined bits.
    #[inline]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL_BITS)
    }

    /// Returns `true` if no flag is set.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every flag in `other` is set.
    #[inline]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any flag in `other` is set.
    #[inline]
    pub const fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Set the flags in `other`.
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the flags in `other`.
    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Returns `true` if an advertised atomic-write flag covers an aligned
    /// write of `size` bytes.
    pub fn atomic_write_size(&self, size: u32) -> bool {
        if self.contains(Self::ATOMIC) {
            return true;
        }
        let granule = match size {
            512 => Self::ATOMIC_512,
            1024 => Self::ATOMIC_1K,
            2048 => Self::ATOMIC_2K,
            4096 => Self::ATOMIC_4K,
            8192 => Self::ATOMIC_8K,
            16384 => Self::ATOMIC_16K,
            32768 => Self::ATOMIC_32K,
            65536 => Self::ATOMIC_64K,
            _ => return false,
        };
        self.contains(granule)
    }

    /// Iterate over the set flags with their names.
    pub fn iter_names(&self) -> impl Iterator<Item = (&'static str, Self)> + '_ {
        Self::NAMED
            .iter()
            .copied()
            .filter(move |(_, flag)| self.contains(*flag))
    }
}

flag_set_ops!(DeviceCharacteristics);

/// Flags passed to and returned from [`Vfs::open`](crate::Vfs::open).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OpenFlags(u32);

impl OpenFlags {
    /// Open for reading only.
    pub const READ_ONLY: Self = Self(0x0000_0001);
    /// Open for reading and writing.
    pub const READ_WRITE: Self = Self(0x0000_0002);
    /// Create the file if missing.
    pub const CREATE: Self = Self(0x0000_0004);
    /// Remove the file when the handle closes.
    pub const DELETE_ON_CLOSE: Self = Self(0x0000_0008);
    /// With `CREATE`, fail if the file already exists.
    pub const EXCLUSIVE: Self = Self(0x0000_0010);
    /// Proxy locking requested.
    pub const AUTO_PROXY: Self = Self(0x0000_0020);
    /// Name is a URI.
    pub const URI: Self = Self(0x0000_0040);
    /// In-memory database.
    pub const MEMORY: Self = Self(0x0000_0080);
    /// Main database file.
    pub const MAIN_DB: Self = Self(0x0000_0100);
    /// Temporary database file.
    pub const TEMP_DB: Self = Self(0x0000_0200);
    /// Transient database file.
    pub const TRANSIENT_DB: Self = Self(0x0000_0400);
    /// Rollback journal of the main database.
    pub const MAIN_JOURNAL: Self = Self(0x0000_0800);
    /// Rollback journal of a temporary database.
    pub const TEMP_JOURNAL: Self = Self(0x0000_1000);
    /// Statement sub-journal.
    pub const SUB_JOURNAL: Self = Self(0x0000_2000);
    /// Multi-database commit journal.
    pub const SUPER_JOURNAL: Self = Self(0x0000_4000);
    /// Connection opened without a mutex.
    pub const NO_MUTEX: Self = Self(0x0000_8000);
    /// Connection opened with a full mutex.
    pub const FULL_MUTEX: Self = Self(0x0001_0000);
    /// Shared cache enabled.
    pub const SHARED_CACHE: Self = Self(0x0002_0000);
    /// Private cache enabled.
    pub const PRIVATE_CACHE: Self = Self(0x0004_0000);
    /// Write-ahead log file.
    pub const WAL: Self = Self(0x0008_0000);
    /// Refuse to follow symbolic links.
    pub const NO_FOLLOW: Self = Self(0x0100_0000);

    const NAMED: [(&'static str, Self); 21] = [
        ("READ_ONLY", Self::READ_ONLY),
        ("READ_WRITE", Self::READ_WRITE),
        ("CREATE", Self::CREATE),
        ("DELETE_ON_CLOSE", Self::DELETE_ON_CLOSE),
        ("EXCLUSIVE", Self::EXCLUSIVE),
        ("AUTO_PROXY", Self::AUTO_PROXY),
        ("URI", Self::URI),
        ("MEMORY", Self::MEMORY),
        ("MAIN_DB", Self::MAIN_DB),
        ("TEMP_DB", Self::TEMP_DB),
        ("TRANSIENT_DB", Self::TRANSIENT_DB),
        ("MAIN_JOURNAL", Self::MAIN_JOURNAL),
        ("TEMP_JOURNAL", Self::TEMP_JOURNAL),
        ("SUB_JOURNAL", Self::SUB_JOURNAL),
        ("SUPER_JOURNAL", Self::SUPER_JOURNAL),
        ("NO_MUTEX", Self::NO_MUTEX),
        ("FULL_MUTEX", Self::FULL_MUTEX),
        ("SHARED_CACHE", Self::SHARED_CACHE),
        ("PRIVATE_CACHE", Self::PRIVATE_CACHE),
        ("WAL", Self::WAL),
        ("NO_FOLLOW", Self::NO_FOLLOW),
    ];

    const ALL_BITS: u32 = 0x010f_ffff;

    /// No flags.
    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Read-write main database, created if missing.
    #[inline]
    pub const fn main_db() -> Self {
        Self(Self::READ_WRITE.0 | Self::CREATE.0 | Self::MAIN_DB.0)
    }

    /// Raw bitmask.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Build from a raw bitmask, rejecting undefined bits.
    ///
    /// # Errors
    ///
    /// [`VfsError::InvalidValue`] if any undefined bit is set.
    pub fn from_bits(bits: u32) -> Result<Self, VfsError> {
        if bits & !Self::ALL_BITS != 0 {
            return Err(VfsError::InvalidValue {
                kind: "open flags",
                value: i64::from(bits),
            });
        }
        Ok(Self(bits))
    }

    /// Build from a raw bitmask, dropping undefined bits.
    #[inline]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL_BITS)
    }

    /// Returns `true` if no flag is set.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every flag in `other` is set.
    #[inline]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the flags in `other`.
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the flags in `other`.
    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Returns `true` unless the handle was asked to be read-only.
    #[inline]
    pub const fn is_writable(&self) -> bool {
        self.contains(Self::READ_WRITE) && !self.contains(Self::READ_ONLY)
    }

    /// Iterate over the set flags with their names.
    pub fn iter_names(&self) -> impl Iterator<Item = (&'static str, Self)> + '_ {
        Self::NAMED
            .iter()
            .copied()
            .filter(move |(_, flag)| self.contains(*flag))
    }
}

flag_set_ops!(OpenFlags);

/// Question asked by [`Vfs::access`](crate::Vfs::access).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum AccessKind {
    /// Does the file exist?
    Exists = 0,
    /// Is the file readable and writable?
    ReadWrite = 1,
    /// Is the file readable?
    Read = 2,
}

impl AccessKind {
    /// Native integer value.
    #[inline]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    /// Decode a native integer value.
    ///
    /// # Errors
    ///
    /// [`VfsError::InvalidValue`] for anything outside `0..=2`.
    pub fn from_raw(raw: i32) -> Result<Self, VfsError> {
        match raw {
            0 => Ok(AccessKind::Exists),
            1 => Ok(AccessKind::ReadWrite),
            2 => Ok(AccessKind::Read),
            _ => Err(VfsError::InvalidValue {
                kind: "access kind",
                value: i64::from(raw),
            }),
        }
    }
}
