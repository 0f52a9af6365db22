//! Error types for the dbvfs storage contract.

use std::path::PathBuf;

use crate::LockLevel;

// Engine result codes. Extended I/O codes are `IOERR | (n << 8)`.
const CODE_ERROR: i32 = 1;
const CODE_BUSY: i32 = 5;
const CODE_READONLY: i32 = 8;
const CODE_IOERR: i32 = 10;
const CODE_CANTOPEN: i32 = 14;

const fn ioerr(n: i32) -> i32 {
    CODE_IOERR | (n << 8)
}

/// Storage contract error with contextual variants.
///
/// Variants carry the path and contract operation involved where that is
/// known. A short *read* is never an error; see
/// [`FileIo::read_at`](crate::FileIo::read_at).
///
/// # Examples
///
/// ```rust
/// use dbvfs::{LockLevel, VfsError};
/// use std::path::PathBuf;
///
/// let err = VfsError::Busy {
///     path: PathBuf::from("/data/app.db"),
///     requested: LockLevel::Reserved,
///     held: LockLevel::Shared,
/// };
/// assert!(err.is_busy());
/// assert_eq!(err.result_code(), 5);
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    /// A lock transition was refused because another holder conflicts.
    #[error("database is busy: {path} (requested {requested}, holding {held})")]
    Busy {
        /// The locked file.
        path: PathBuf,
        /// The level that was asked for.
        requested: LockLevel,
        /// The level the handle still holds after the failure.
        held: LockLevel,
    },

    /// Fewer bytes were written than requested.
    #[error("short write to {path} at offset {offset}: wrote {written} of {expected} bytes")]
    ShortWrite {
        /// The file written to.
        path: PathBuf,
        /// The write offset.
        offset: u64,
        /// Bytes actually written.
        written: usize,
        /// Bytes requested.
        expected: usize,
    },

    /// A storage operation failed.
    #[error("{operation} failed for {path}: {source}")]
    Io {
        /// The contract operation that failed.
        operation: &'static str,
        /// The path involved in the operation.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The lock arbiter found its slots in a state the protocol forbids.
    #[error("lock protocol violation on {path}: {details}")]
    LockProtocol {
        /// The locked file.
        path: PathBuf,
        /// What went wrong.
        details: String,
    },

    /// File does not exist.
    #[error("not found: {path}")]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// File exists when exclusive creation was requested.
    #[error("{operation}: already exists: {path}")]
    AlreadyExists {
        /// The existing path.
        path: PathBuf,
        /// The operation that failed.
        operation: &'static str,
    },

    /// Write attempted through a read-only handle.
    #[error("read-only handle: {operation} on {path}")]
    ReadOnly {
        /// The file.
        path: PathBuf,
        /// The refused operation.
        operation: &'static str,
    },

    /// A backend is already registered under this name.
    #[error("vfs already registered: {name}")]
    DuplicateName {
        /// The contested name.
        name: String,
    },

    /// No backend is registered under this name.
    #[error("no such vfs: {name}")]
    UnknownVfs {
        /// The requested name.
        name: String,
    },

    /// A connection target could not be parsed.
    #[error("invalid target {target:?}: {reason}")]
    InvalidTarget {
        /// The raw target string.
        target: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Backend options are invalid or could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A raw value crossing the native boundary is out of range.
    #[error("invalid {kind}: {value:#x}")]
    InvalidValue {
        /// What was being decoded.
        kind: &'static str,
        /// The offending raw value.
        value: i64,
    },
}

impl VfsError {
    /// Wrap an I/O error with the failing operation and path.
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VfsError::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Returns `true` for lock contention.
    #[inline]
    pub fn is_busy(&self) -> bool {
        matches!(self, VfsError::Busy { .. })
    }

    /// Returns `true` if retrying the same call may succeed.
    ///
    /// Only contention is retryable; this layer never retries on its own.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.is_busy()
    }

    /// Extended result code understood by the native engine.
    pub fn result_code(&self) -> i32 {
        match self {
            VfsError::Busy { .. } => CODE_BUSY,
            VfsError::ShortWrite { .. } => ioerr(3),
            VfsError::Io { operation, .. } => match *operation {
                "read" => ioerr(1),
                "write" => ioerr(3),
                "sync" => ioerr(4),
                "truncate" => ioerr(6),
                "file_size" => ioerr(7),
                "unlock" => ioerr(8),
                "lock_shared" => ioerr(9),
                "delete" => ioerr(10),
                "access" => ioerr(13),
                "check_reserved_lock" => ioerr(14),
                "lock" => ioerr(15),
                "close" => ioerr(16),
                "open" => CODE_CANTOPEN,
                _ => CODE_IOERR,
            },
            VfsError::LockProtocol { .. } => ioerr(15),
            VfsError::NotFound { .. } | VfsError::AlreadyExists { .. } => CODE_CANTOPEN,
            VfsError::ReadOnly { .. } => CODE_READONLY,
            VfsError::DuplicateName { .. }
            | VfsError::UnknownVfs { .. }
            | VfsError::InvalidTarget { .. }
            | VfsError::Config(_)
            | VfsError::InvalidValue { .. } => CODE_ERROR,
        }
    }
}

impl From<std::io::Error> for VfsError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => VfsError::NotFound {
                path: PathBuf::new(),
            },
            std::io::ErrorKind::AlreadyExists => VfsError::AlreadyExists {
                path: PathBuf::new(),
                operation: "io",
            },
            _ => VfsError::Io {
                operation: "io",
                path: PathBuf::new(),
                source: error,
            },
        }
    }
}
