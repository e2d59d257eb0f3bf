//! Virtual Filesystem abstraction.
//!
//! Key components:
//!
//! - [`VfsOps`] - Core trait for filesystem operations
//! - [`FileAttr`], [`DirEntry`] - What the transport renders
//! - [`FsError`] - The three failure kinds surfaced to the transport
//!
//! ## Design Decisions
//!
//! - **Path-based, no inodes**: Operations use paths, not inode numbers.
//!   FUSE clients handle inode ↔ path mapping locally.
//! - **Explicit offset/size**: Read/write take offset and size without
//!   handle state.

mod error;
mod ops;
mod types;

pub use error::{FsError, FsResult};
pub use ops::VfsOps;
pub use types::{DirEntry, FileAttr, FileType, StatFs, DIRECTORY_SIZE};
