//! Server configuration constants.

use std::time::Duration;

/// Inode of the mount root.
pub const ROOT_INODE: u64 = 1;

/// How long the kernel may cache attributes and entries.
///
/// Kept at zero so new conversations and fresh transcripts are visible to
/// the next call.
pub const ATTR_TTL: Duration = Duration::from_secs(0);

/// Block size reported in attributes.
pub const BLOCK_SIZE: u32 = 4096;

/// Helper used to release a stale FUSE mount.
pub const FUSERMOUNT: &str = "fusermount";
