//! convofs server library
//!
//! Hosts a [`convofs_kernel::ConversationFs`] behind a FUSE mount.

pub mod constants;
pub mod fuse;
pub mod inode;
pub mod mount;

pub use fuse::{ConvoFuse, FuseOps};
pub use inode::InodeTable;
pub use mount::{FuseTransport, MountError, MountEvent, MountManager, MountTransport};
