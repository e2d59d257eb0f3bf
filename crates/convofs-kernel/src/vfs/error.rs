//! VFS error types.

use std::io;
use thiserror::Error;

use crate::backend::BackendError;

/// VFS error type.
///
/// The adapter surfaces exactly three failure kinds to the transport. Every
/// backend failure collapses into [`FsError::BackendUnavailable`]; transient
/// and permanent failures are not distinguished.
#[derive(Debug, Error)]
pub enum FsError {
    /// Path or conversation id does not resolve to an existing entry.
    #[error("not found: {0}")]
    NotFound(String),

    /// Directory operation on a non-directory target.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The conversation service failed or was unreachable.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl FsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create a BackendUnavailable error.
    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// The errno a FUSE reply should carry for this error.
    #[cfg(unix)]
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::BackendUnavailable(_) => libc::EIO,
        }
    }
}

impl From<BackendError> for FsError {
    fn from(e: BackendError) -> Self {
        FsError::BackendUnavailable(e.to_string())
    }
}

/// Convert FsError to std::io::Error for compatibility.
impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            FsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            FsError::BackendUnavailable(msg) => io::Error::other(msg),
        }
    }
}

/// VFS result type.
pub type FsResult<T> = Result<T, FsError>;
