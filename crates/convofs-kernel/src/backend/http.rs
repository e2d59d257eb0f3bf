//! HTTP client for a remote conversation service.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    BackendError, BackendResult, ConversationBackend, ConversationConfig, Message, Role,
};

/// Default service endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

#[derive(Serialize)]
struct CreateConversationBody<'a> {
    model: &'a str,
    max_tokens: u32,
}

#[derive(Serialize)]
struct AppendMessageBody<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Deserialize)]
struct CreatedConversation {
    id: String,
}

/// REST client for the conversation service.
///
/// ```text
/// POST {base}/v1/conversations                  {"model","max_tokens"} -> {"id"}
/// GET  {base}/v1/conversations/{id}/messages    -> {"data":[{"role","content"}]}
/// POST {base}/v1/conversations/{id}/messages    {"role","content"}
/// ```
///
/// No client-side timeout is configured: a hung call hangs its caller.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl HttpBackend {
    /// Create a client for the service at `base_url`.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> BackendResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// The normalized base URL (no trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn conversations_url(&self) -> String {
        format!("{}/v1/conversations", self.base_url)
    }

    // Ids are opaque; encode so `/` or spaces cannot change the route.
    fn messages_url(&self, conversation_id: &str) -> String {
        format!(
            "{}/v1/conversations/{}/messages",
            self.base_url,
            urlencoding::encode(conversation_id)
        )
    }

    /// Send a request and return the decoded JSON body of a success response.
    async fn send(&self, request: reqwest::RequestBuilder) -> BackendResult<Value> {
        let response = request
            .header("x-api-key", &self.api_key)
            .header("content-type", "application/json")
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_status(status, body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

fn classify_status(status: StatusCode, body: String) -> BackendError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Auth(body),
        _ => BackendError::Status {
            status: status.as_u16(),
            body,
        },
    }
}

/// Decode a message list: `{"data":[...]}` or a bare array.
fn parse_messages(body: Value) -> BackendResult<Vec<Message>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => return Err(BackendError::Decode("missing `data` array".into())),
        },
        other => return Err(BackendError::Decode(format!("unexpected body: {other}"))),
    };
    items.into_iter().map(parse_message).collect()
}

fn parse_message(item: Value) -> BackendResult<Message> {
    let role = item
        .get("role")
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::Decode("message without role".into()))?;
    let role = Role::from_wire(role);

    // Content is either a plain string or a list of typed blocks; only text
    // blocks contribute to the transcript.
    let content = match item.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        Some(Value::Null) | None => String::new(),
        Some(other) => return Err(BackendError::Decode(format!("unexpected content: {other}"))),
    };
    Ok(Message { role, content })
}

#[async_trait]
impl ConversationBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    #[tracing::instrument(name = "backend.create_conversation", skip(self, config), fields(model = %config.model))]
    async fn create_conversation(&self, config: &ConversationConfig) -> BackendResult<String> {
        let body = CreateConversationBody {
            model: &config.model,
            max_tokens: config.max_tokens,
        };
        let value = self
            .send(self.client.post(self.conversations_url()).json(&body))
            .await?;
        let created: CreatedConversation =
            serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(created.id)
    }

    #[tracing::instrument(name = "backend.list_messages", skip(self))]
    async fn list_messages(&self, conversation_id: &str) -> BackendResult<Vec<Message>> {
        let value = self
            .send(self.client.get(self.messages_url(conversation_id)))
            .await?;
        parse_messages(value)
    }

    #[tracing::instrument(name = "backend.append_message", skip(self, content), fields(len = content.len()))]
    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> BackendResult<()> {
        let body = AppendMessageBody { role, content };
        self.send(
            self.client
                .post(self.messages_url(conversation_id))
                .json(&body),
        )
        .await?;
        Ok(())
    }
}
