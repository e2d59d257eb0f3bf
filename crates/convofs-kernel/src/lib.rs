//! # convofs-kernel
//!
//! Exposes a remote conversation service as a virtual filesystem.
//!
//! - [`NamespaceTarget`] classifies every path (pure, no I/O)
//! - [`ConversationIndex`] holds the conversations this process knows about
//! - [`ConversationFs`] answers getattr/readdir/read/write against a
//!   [`ConversationBackend`]
//!
//! Writing to `/conversations` creates a conversation; writing to
//! `/conversations/<id>` appends a user message; reading
//! `/conversations/<id>` renders the transcript as `role: content` lines.

pub mod backend;
pub mod config;
pub mod conversation_fs;
pub mod index;
pub mod namespace;
pub mod vfs;

pub use backend::{
    BackendError, BackendResult, ConversationBackend, ConversationConfig, HttpBackend,
    MemoryConversations, Message, Role,
};
pub use config::{BackendConfig, BackendKind, Config, ConfigError, MountConfig};
pub use conversation_fs::{ConversationFs, render_transcript};
pub use index::{ConversationIndex, ConversationRecord};
pub use namespace::{NamespaceTarget, CONVERSATIONS, ROOT_ENTRIES};
pub use vfs::{DirEntry, FileAttr, FileType, FsError, FsResult, StatFs, VfsOps};
