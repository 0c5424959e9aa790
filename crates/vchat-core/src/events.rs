//! Conversation event types

use serde::{Deserialize, Serialize};
use vchat_api::{ConversationId, Message, MessageId, StreamId};

/// Events emitted while a conversation changes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// The optimistic user message was appended
    UserMessage { message: Message },

    /// A placeholder was appended and its stream is being opened
    AssistantStarted {
        message_id: MessageId,
        stream_id: StreamId,
    },

    /// Text appended to the placeholder
    Delta { message_id: MessageId, text: String },

    /// The stream finished normally
    Completed { message_id: MessageId },

    /// The send failed; `message_id` names the message now holding the
    /// outcome (apology or partial answer)
    Failed {
        message_id: MessageId,
        error: String,
    },

    /// The backend opened a new conversation for this session
    ConversationCreated {
        id: ConversationId,
        title: Option<String>,
    },

    /// The transcript was cleared or replaced
    Reset,
}

impl ConversationEvent {
    /// Check if this event ends a send
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConversationEvent::Completed { .. } | ConversationEvent::Failed { .. }
        )
    }
}
