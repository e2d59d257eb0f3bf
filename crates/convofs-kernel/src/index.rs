//! In-memory index of known conversations.
//!
//! The index is the single source of truth for "does this id exist". An id
//! is inserted only after the backend has acknowledged the create, so no
//! reader ever observes an id the backend does not know about.

use std::collections::BTreeMap;
use std::time::SystemTime;

use parking_lot::RwLock;

/// Lightweight metadata for one remote conversation.
///
/// Messages are never cached here; reads always go to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRecord {
    /// Backend-assigned id, immutable.
    pub id: String,
    /// When the backend acknowledged the create.
    pub created_at: SystemTime,
    /// Model the conversation was created with.
    pub model: String,
}

impl ConversationRecord {
    /// Record for a conversation created just now.
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: SystemTime::now(),
            model: model.into(),
        }
    }
}

/// Map from conversation id to [`ConversationRecord`].
///
/// Reads take a shared lock and run in parallel; inserts are mutually
/// exclusive. The lock is never held across an `.await`.
#[derive(Debug, Default)]
pub struct ConversationIndex {
    records: RwLock<BTreeMap<String, ConversationRecord>>,
}

impl ConversationIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the id is known.
    pub fn contains(&self, id: &str) -> bool {
        self.records.read().contains_key(id)
    }

    /// Look up a record by id.
    pub fn get(&self, id: &str) -> Option<ConversationRecord> {
        self.records.read().get(id).cloned()
    }

    /// Insert a record whose create the backend has acknowledged.
    ///
    /// Returns false (and leaves the existing record untouched) if the id
    /// was already present; ids are immutable once set.
    pub fn insert(&self, record: ConversationRecord) -> bool {
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return false;
        }
        records.insert(record.id.clone(), record);
        true
    }

    /// Snapshot of all ids, taken under a single read lock.
    pub fn ids(&self) -> Vec<String> {
        self.records.read().keys().cloned().collect()
    }

    /// Number of known conversations.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no conversations are known.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
