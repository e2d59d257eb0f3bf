//! VFS operations trait.
//!
//! This trait defines the filesystem operations the transport invokes
//! (path-based, no inodes, explicit offset/size).

use async_trait::async_trait;
use std::path::Path;

use super::types::{DirEntry, FileAttr, StatFs};
use super::FsResult;

/// Chunk size used by [`VfsOps::read_all`].
const READ_CHUNK: u32 = 64 * 1024;

/// Core VFS operations trait.
///
/// All operations are path-based (no inode numbers). The FUSE bridge
/// handles inode ↔ path mapping locally.
///
/// Implementations must tolerate concurrent calls from independent callers.
#[async_trait]
pub trait VfsOps: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Get file attributes.
    async fn getattr(&self, path: &Path) -> FsResult<FileAttr>;

    /// Read directory entries.
    ///
    /// Returns all entries in the directory (no pagination).
    async fn readdir(&self, path: &Path) -> FsResult<Vec<DirEntry>>;

    /// Read file contents.
    ///
    /// Reads up to `size` bytes starting at `offset`. Returns fewer bytes
    /// (possibly none) if EOF is reached.
    async fn read(&self, path: &Path, offset: u64, size: u32) -> FsResult<Vec<u8>>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Write data to a file.
    ///
    /// Returns the number of bytes accepted.
    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> FsResult<u32>;

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Get filesystem statistics.
    async fn statfs(&self) -> FsResult<StatFs>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Read entire file contents.
    ///
    /// Reads in chunks until a short read, since reported sizes are hints.
    async fn read_all(&self, path: &Path) -> FsResult<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let chunk = self.read(path, out.len() as u64, READ_CHUNK).await?;
            let short = chunk.len() < READ_CHUNK as usize;
            out.extend_from_slice(&chunk);
            if short {
                return Ok(out);
            }
        }
    }
}
