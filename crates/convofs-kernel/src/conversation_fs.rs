//! The conversation filesystem adapter.
//!
//! Translates path-based filesystem calls into namespace targets and then
//! into conversation backend calls:
//!
//! | Target | getattr | readdir | read | write |
//! |---|---|---|---|---|
//! | `/` | dir | fixed root names | - | NotFound |
//! | `/conversations` | dir | index snapshot | - | create conversation |
//! | `/conversations/<id>` | file (if indexed) | NotADirectory | transcript | append user message |
//! | anything else | NotFound | NotADirectory | NotFound | NotFound |
//!
//! Conversation state per id is `Unknown → Created`; appends keep it
//! `Created`. Nothing is ever deleted.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::backend::{ConversationBackend, ConversationConfig, Message, Role};
use crate::index::{ConversationIndex, ConversationRecord};
use crate::namespace::{NamespaceTarget, ROOT_ENTRIES};
use crate::vfs::{DirEntry, FileAttr, FsError, FsResult, StatFs, VfsOps};

/// Permissions reported for directories.
const DIR_PERM: u32 = 0o755;

/// Permissions reported for conversation files.
const FILE_PERM: u32 = 0o644;

/// Render messages as `role: content` lines joined by `\n`, in backend order.
pub fn render_transcript(messages: &[Message]) -> Vec<u8> {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
        .into_bytes()
}

/// Clip `[offset, offset + size)` to the available bytes.
///
/// An offset at or past the end yields an empty slice, not an error.
fn byte_range(data: &[u8], offset: u64, size: u32) -> &[u8] {
    let len = data.len() as u64;
    let start = offset.min(len) as usize;
    let end = offset.saturating_add(size as u64).min(len) as usize;
    &data[start..end]
}

/// Bytes accepted for a write, saturated to the reply width.
fn accepted(data: &[u8]) -> u32 {
    u32::try_from(data.len()).unwrap_or(u32::MAX)
}

/// Virtual filesystem over a conversation backend.
///
/// Cheap to share behind an `Arc`; all mutable state lives in the
/// [`ConversationIndex`].
pub struct ConversationFs {
    backend: Arc<dyn ConversationBackend>,
    index: Arc<ConversationIndex>,
    config: ConversationConfig,
}

impl std::fmt::Debug for ConversationFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationFs")
            .field("backend", &self.backend.name())
            .field("conversations", &self.index.len())
            .field("config", &self.config)
            .finish()
    }
}

impl ConversationFs {
    /// Create an adapter with an empty index.
    pub fn new(backend: Arc<dyn ConversationBackend>, config: ConversationConfig) -> Self {
        Self {
            backend,
            index: Arc::new(ConversationIndex::new()),
            config,
        }
    }

    /// The conversation index.
    pub fn index(&self) -> &Arc<ConversationIndex> {
        &self.index
    }

    // ========================================================================
    // Attribute service
    // ========================================================================

    /// Describe a resolved target.
    pub fn attributes(&self, target: &NamespaceTarget) -> FsResult<FileAttr> {
        match target {
            NamespaceTarget::RootDirectory | NamespaceTarget::ConversationCollection => {
                Ok(FileAttr::directory(DIR_PERM))
            }
            NamespaceTarget::ConversationEntry(id) => {
                let record = self.index.get(id).ok_or_else(|| FsError::not_found(id.as_str()))?;
                Ok(FileAttr::file(0, FILE_PERM).with_mtime(record.created_at))
            }
            NamespaceTarget::Unresolved => Err(FsError::not_found("unresolved path")),
        }
    }

    // ========================================================================
    // Directory lister
    // ========================================================================

    /// Child entries of a directory-class target.
    pub fn list(&self, target: &NamespaceTarget) -> FsResult<Vec<DirEntry>> {
        match target {
            NamespaceTarget::RootDirectory => Ok(ROOT_ENTRIES
                .iter()
                .map(|(name, kind)| DirEntry::new(*name, *kind))
                .collect()),
            NamespaceTarget::ConversationCollection => {
                Ok(self.index.ids().into_iter().map(DirEntry::file).collect())
            }
            NamespaceTarget::ConversationEntry(id) => Err(FsError::not_a_directory(id.as_str())),
            NamespaceTarget::Unresolved => Err(FsError::not_a_directory("unresolved path")),
        }
    }

    // ========================================================================
    // Content reader
    // ========================================================================

    /// Render a conversation's transcript and return the requested range.
    ///
    /// Re-fetches from the backend on every call.
    pub async fn read_conversation(&self, id: &str, offset: u64, size: u32) -> FsResult<Vec<u8>> {
        if !self.index.contains(id) {
            return Err(FsError::not_found(id));
        }
        let messages = self.backend.list_messages(id).await.map_err(|e| {
            tracing::warn!(conversation = %id, error = %e, "list_messages failed");
            FsError::from(e)
        })?;
        let transcript = render_transcript(&messages);
        Ok(byte_range(&transcript, offset, size).to_vec())
    }

    // ========================================================================
    // Content writer
    // ========================================================================

    /// Create a conversation and index it once the backend acknowledges.
    ///
    /// The index is untouched if the backend call fails.
    pub async fn create_conversation(&self) -> FsResult<ConversationRecord> {
        let id = self
            .backend
            .create_conversation(&self.config)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "create_conversation failed");
                FsError::from(e)
            })?;

        let record = ConversationRecord::new(id, self.config.model.clone());
        if self.index.insert(record.clone()) {
            tracing::info!(conversation = %record.id, model = %record.model, "conversation created");
            Ok(record)
        } else {
            tracing::warn!(conversation = %record.id, "backend returned an id already indexed");
            Ok(self.index.get(&record.id).unwrap_or(record))
        }
    }

    /// Append `content` as a user message to an indexed conversation.
    pub async fn append_user_message(&self, id: &str, content: &str) -> FsResult<()> {
        if !self.index.contains(id) {
            return Err(FsError::not_found(id));
        }
        self.backend
            .append_message(id, Role::User, content)
            .await
            .map_err(|e| {
                tracing::warn!(conversation = %id, error = %e, "append_message failed");
                FsError::from(e)
            })
    }

    /// Interpret a written buffer against a resolved target.
    ///
    /// Every write is a complete unit of intent; the offset is ignored.
    pub async fn write_target(&self, target: &NamespaceTarget, data: &[u8]) -> FsResult<u32> {
        match target {
            NamespaceTarget::ConversationCollection => {
                self.create_conversation().await?;
                Ok(accepted(data))
            }
            NamespaceTarget::ConversationEntry(id) => {
                let content = String::from_utf8_lossy(data);
                self.append_user_message(id, &content).await?;
                Ok(accepted(data))
            }
            NamespaceTarget::RootDirectory => Err(FsError::not_found("/")),
            NamespaceTarget::Unresolved => Err(FsError::not_found("unresolved path")),
        }
    }
}

#[async_trait]
impl VfsOps for ConversationFs {
    #[tracing::instrument(name = "fs.getattr", level = "debug", skip(self))]
    async fn getattr(&self, path: &Path) -> FsResult<FileAttr> {
        self.attributes(&NamespaceTarget::resolve_path(path))
            .map_err(|e| with_path(e, path))
    }

    #[tracing::instrument(name = "fs.readdir", level = "debug", skip(self))]
    async fn readdir(&self, path: &Path) -> FsResult<Vec<DirEntry>> {
        self.list(&NamespaceTarget::resolve_path(path))
            .map_err(|e| with_path(e, path))
    }

    #[tracing::instrument(name = "fs.read", level = "debug", skip(self))]
    async fn read(&self, path: &Path, offset: u64, size: u32) -> FsResult<Vec<u8>> {
        match NamespaceTarget::resolve_path(path) {
            NamespaceTarget::ConversationEntry(id) => {
                self.read_conversation(&id, offset, size).await
            }
            _ => Err(FsError::not_found(path.display().to_string())),
        }
    }

    #[tracing::instrument(name = "fs.write", level = "debug", skip(self, data), fields(len = data.len()))]
    async fn write(&self, path: &Path, _offset: u64, data: &[u8]) -> FsResult<u32> {
        self.write_target(&NamespaceTarget::resolve_path(path), data)
            .await
            .map_err(|e| with_path(e, path))
    }

    async fn statfs(&self) -> FsResult<StatFs> {
        Ok(StatFs::default())
    }
}

/// Replace the generic context on namespace errors with the caller's path.
fn with_path(err: FsError, path: &Path) -> FsError {
    match err {
        FsError::NotFound(_) => FsError::not_found(path.display().to_string()),
        FsError::NotADirectory(_) => FsError::not_a_directory(path.display().to_string()),
        other => other,
    }
}
