//! Namespace resolution: path string → semantic target.
//!
//! ```text
//! /                         (directory)
//! /conversations            (directory; children = live conversation ids)
//! /conversations/<id>       (file; rendered transcript)
//! /completions              (directory stub; reserved)
//! /config                   (directory stub; reserved)
//! /status.txt               (file stub; reserved)
//! ```
//!
//! Only `/conversations` is wired to behavior. The stubs appear in the root
//! listing but resolve to [`NamespaceTarget::Unresolved`].

use std::path::Path;

use crate::vfs::FileType;

/// Name of the conversation collection directory.
pub const CONVERSATIONS: &str = "conversations";

/// Fixed root children and their kinds, in listing order.
pub const ROOT_ENTRIES: [(&str, FileType); 4] = [
    (CONVERSATIONS, FileType::Directory),
    ("completions", FileType::Directory),
    ("config", FileType::Directory),
    ("status.txt", FileType::File),
];

/// Semantic classification of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NamespaceTarget {
    /// `/`
    RootDirectory,
    /// `/conversations`
    ConversationCollection,
    /// `/conversations/<id>`. Existence of `id` is not checked here.
    ConversationEntry(String),
    /// Anything else, including the reserved root stubs.
    Unresolved,
}

impl NamespaceTarget {
    /// Classify a path string.
    ///
    /// Pure and total: empty segments (leading, trailing or doubled slashes)
    /// are collapsed, and segments are otherwise opaque.
    pub fn resolve(path: &str) -> Self {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        match (segments.next(), segments.next(), segments.next()) {
            (None, _, _) => NamespaceTarget::RootDirectory,
            (Some(CONVERSATIONS), None, _) => NamespaceTarget::ConversationCollection,
            (Some(CONVERSATIONS), Some(id), None) => {
                NamespaceTarget::ConversationEntry(id.to_string())
            }
            _ => NamespaceTarget::Unresolved,
        }
    }

    /// Classify a filesystem path.
    ///
    /// Non-UTF-8 components are converted lossily; they can never name a
    /// backend-issued id, so they resolve the same way an unknown id does.
    pub fn resolve_path(path: &Path) -> Self {
        Self::resolve(&path.to_string_lossy())
    }

    /// Returns true for directory-class targets.
    pub fn is_directory(&self) -> bool {
        matches!(
            self,
            NamespaceTarget::RootDirectory | NamespaceTarget::ConversationCollection
        )
    }

    /// The conversation id, if this target names one.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            NamespaceTarget::ConversationEntry(id) => Some(id),
            _ => None,
        }
    }
}
