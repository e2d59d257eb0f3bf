//! Conversation backend abstraction.
//!
//! The backend owns authoritative conversation and message state. The
//! adapter only ever calls the three operations on [`ConversationBackend`];
//! it never stores messages locally.

mod http;
mod memory;

pub use http::{HttpBackend, DEFAULT_BASE_URL};
pub use memory::MemoryConversations;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::EnumString;

/// Default model every conversation is created with.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";

/// Default `max_tokens` every conversation is created with.
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Role of a message in a conversation.
///
/// Roles the service reports beyond the known three are kept verbatim in
/// [`Role::Other`] so transcripts still render.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Role {
    /// Human/user message.
    #[strum(serialize = "user", serialize = "human")]
    User,
    /// Assistant/model message.
    #[strum(serialize = "assistant", serialize = "model")]
    Assistant,
    /// System message.
    System,
    /// Any other role name, as received.
    #[serde(untagged)]
    #[strum(disabled)]
    Other(String),
}

impl Role {
    /// Parse a known role (case-insensitive, with aliases).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Parse any role name, keeping unknown ones as [`Role::Other`].
    pub fn from_wire(s: &str) -> Self {
        Self::from_str(s).unwrap_or_else(|| Role::Other(s.to_string()))
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Other(name) => name,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message.
    pub role: Role,
    /// Message content.
    pub content: String,
}

impl Message {
    /// Create a message.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Parameters a conversation is created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Model identifier.
    pub model: String,
    /// Maximum tokens per reply.
    pub max_tokens: u32,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Error type for backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Transport-level failure (connect, TLS, reset).
    #[error("network error: {0}")]
    Network(String),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Non-success HTTP status.
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The service does not know this conversation.
    #[error("unknown conversation: {0}")]
    UnknownConversation(String),

    /// Failure injected or reported by a non-HTTP backend.
    #[error("{0}")]
    Other(String),
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Client for a remote conversation service.
///
/// Calls block the caller until the service answers. There are no retries
/// and no timeouts at this layer.
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// Backend name for logs (e.g., "http", "memory").
    fn name(&self) -> &str;

    /// Create a conversation, returning the service-assigned id.
    async fn create_conversation(&self, config: &ConversationConfig) -> BackendResult<String>;

    /// All messages of a conversation, in service order.
    async fn list_messages(&self, conversation_id: &str) -> BackendResult<Vec<Message>>;

    /// Append a message to a conversation.
    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> BackendResult<()>;
}
