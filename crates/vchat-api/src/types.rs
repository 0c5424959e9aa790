//! Core types shared by the chat client and the backend wire format

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Identity of a message in the local transcript.
///
/// Ids minted on this side (optimistic user turns, assistant placeholders,
/// synthetic error turns) live in a different namespace from ids issued by
/// the backend, so a placeholder can never be confused with a stored message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "origin", content = "value", rename_all = "snake_case")]
pub enum MessageId {
    /// Minted locally
    ClientSynthetic(String),
    /// Issued by the backend
    ServerAssigned(String),
}

impl MessageId {
    /// Fresh id for an optimistic user message
    pub fn new_user() -> Self {
        Self::ClientSynthetic(format!("user-{}", uuid::Uuid::new_v4()))
    }

    /// Id of the assistant placeholder bound to a stream
    pub fn placeholder_for(stream_id: &StreamId) -> Self {
        Self::ClientSynthetic(format!("assistant-{}", stream_id))
    }

    /// Fresh id for a synthetic assistant error message
    pub fn new_error() -> Self {
        Self::ClientSynthetic(format!("assistant-error-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ClientSynthetic(id) | Self::ServerAssigned(id) => id,
        }
    }

    pub fn is_client_synthetic(&self) -> bool {
        matches!(self, Self::ClientSynthetic(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message in the local transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    /// Text accumulator; assistant placeholders start empty
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Set only while an assistant placeholder waits for its first chunk
    #[serde(default)]
    pub thinking: bool,
}

impl Message {
    /// Create an optimistic user message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new_user(),
            role: Role::User,
            content: text.into(),
            created_at: Utc::now(),
            thinking: false,
        }
    }

    /// Create an empty assistant placeholder awaiting its first chunk
    pub fn placeholder(id: MessageId) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: String::new(),
            created_at: Utc::now(),
            thinking: true,
        }
    }

    /// Create a finished assistant message
    pub fn assistant(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
            thinking: false,
        }
    }

    /// Whether this turn is worth sending back to the backend as history.
    ///
    /// Placeholders and assistant turns that never received text are dropped.
    pub fn is_meaningful_history(&self) -> bool {
        match self.role {
            Role::User => true,
            Role::Assistant => !self.content.trim().is_empty(),
        }
    }

    /// Wire form used in the history payload
    pub fn to_wire(&self) -> WireTurn {
        WireTurn {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// One turn of the history sent with a guest send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTurn {
    pub role: Role,
    pub content: String,
}

impl WireTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Opaque token naming one incremental response channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub String);

impl StreamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-side conversation id.
///
/// The backend uses integer ids, but an id is sent back in the same JSON form
/// it arrived in, so `"007"` never turns into `7`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationId {
    Numeric(i64),
    Text(String),
}

impl ConversationId {
    /// Parse a user-supplied id; canonical integers become numeric ids.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        match id.parse::<i64>() {
            Ok(n) if n.to_string() == id => Self::Numeric(n),
            _ => Self::Text(id),
        }
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => f.pad(&n.to_string()),
            Self::Text(s) => f.pad(s),
        }
    }
}

impl Serialize for ConversationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Numeric(n) => serializer.serialize_i64(*n),
            Self::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for ConversationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => Ok(Self::Text(s)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(n) => Ok(Self::Numeric(n)),
                None => Ok(Self::Text(n.to_string())),
            },
            other => Err(serde::de::Error::custom(format!(
                "expected string or number id, got {}",
                other
            ))),
        }
    }
}

/// Accept a JSON string or number and keep it as a string
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

fn optional_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Input to a send-message call
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    /// Sanitized history, ending with the new user turn
    pub messages: Vec<WireTurn>,
    /// Conversation to continue (registered sessions only)
    pub conversation_id: Option<ConversationId>,
}

impl SendRequest {
    /// Text of the newest user turn
    pub fn latest_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
    }
}

/// Guest wire body: the whole sanitized history
#[derive(Debug, Serialize)]
pub(crate) struct GuestSendBody<'a> {
    pub messages: &'a [WireTurn],
}

/// Registered wire body: the backend keeps history server-side
#[derive(Debug, Serialize)]
pub(crate) struct RegisteredSendBody<'a> {
    pub content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<&'a ConversationId>,
}

/// Answer to a send-message call
#[derive(Debug, Clone, Deserialize)]
pub struct SendResponse {
    pub stream_id: StreamId,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub message_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Raw send answer before the stream id is validated
#[derive(Debug, Deserialize)]
pub(crate) struct RawSendResponse {
    #[serde(default)]
    pub stream_id: Option<StreamId>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub message_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl RawSendResponse {
    pub(crate) fn into_response(self) -> crate::Result<SendResponse> {
        let stream_id = self
            .stream_id
            .filter(|s| !s.0.is_empty())
            .ok_or(crate::Error::MissingStreamId)?;
        Ok(SendResponse {
            stream_id,
            message_id: self.message_id,
            conversation_id: self.conversation_id,
            title: self.title,
            status: self.status,
        })
    }
}

/// Entry of the registered user's conversation list
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub pinned_at: Option<String>,
    #[serde(default)]
    pub message_count: u32,
}

/// Answer to a pin/unpin call
#[derive(Debug, Clone, Deserialize)]
pub struct PinState {
    pub id: ConversationId,
    pub pinned: bool,
    #[serde(default)]
    pub pinned_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConversationList {
    #[serde(default)]
    pub conversations: Vec<ConversationSummary>,
}

/// A stored message as returned by the history endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl HistoryMessage {
    /// Convert into a transcript message
    pub fn into_message(self) -> Message {
        let created_at = self
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        Message {
            id: MessageId::ServerAssigned(self.id),
            role: self.role,
            content: self.content,
            created_at,
            thinking: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryResponse {
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
}

/// Parse a backend timestamp.
///
/// Accepts RFC 3339 and the naive ISO form the backend emits, which is UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parsed payload of a `chunk` frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChunkPayload(pub serde_json::Value);

impl ChunkPayload {
    /// Text delta carried by this chunk.
    ///
    /// The first non-empty string among `content`, `delta` and `text` wins.
    pub fn delta_text(&self) -> &str {
        ["content", "delta", "text"]
            .iter()
            .filter_map(|key| self.0.get(*key).and_then(|v| v.as_str()))
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.0
    }
}
