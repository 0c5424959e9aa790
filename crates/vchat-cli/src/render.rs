//! Turns conversation events into terminal output

use vchat_core::{ConversationEvent, SharedStore};

/// Writes one streamed answer to stdout as it arrives.
///
/// Answers that never produced a delta (apologies, empty completions) are
/// printed whole from the transcript once the send ends.
pub struct AnswerPrinter {
    store: SharedStore,
    printed: bool,
}

impl AnswerPrinter {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            printed: false,
        }
    }

    /// Text to print for `event`, if any
    pub fn render(&mut self, event: &ConversationEvent) -> Option<String> {
        match event {
            ConversationEvent::AssistantStarted { .. } => {
                self.printed = false;
                None
            }
            ConversationEvent::Delta { text, .. } => {
                self.printed = true;
                Some(text.clone())
            }
            ConversationEvent::Completed { message_id }
            | ConversationEvent::Failed { message_id, .. } => {
                if std::mem::take(&mut self.printed) {
                    return Some("\n".to_string());
                }
                let content = self
                    .store
                    .lock()
                    .get(message_id)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                Some(format!("{}\n", content))
            }
            ConversationEvent::ConversationCreated { id, title } => Some(match title {
                Some(title) => format!("(conversation {}: {})\n", id, title),
                None => format!("(conversation {})\n", id),
            }),
            ConversationEvent::UserMessage { .. } | ConversationEvent::Reset => None,
        }
    }

    /// Line break owed by an answer that stopped without a terminal event
    pub fn finish(&mut self) -> Option<String> {
        std::mem::take(&mut self.printed).then(|| "\n".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vchat_api::{ConversationId, Message, MessageId, StreamId};
    use vchat_core::MessageStore;

    #[test]
    fn test_deltas_then_newline() {
        let mut printer = AnswerPrinter::new(MessageStore::new().shared());
        let message_id = MessageId::placeholder_for(&StreamId::new("s"));

        let started = ConversationEvent::AssistantStarted {
            message_id: message_id.clone(),
            stream_id: StreamId::new("s"),
        };
        assert_eq!(printer.render(&started), None);
        let delta = ConversationEvent::Delta {
            message_id: message_id.clone(),
            text: "Chào".to_string(),
        };
        assert_eq!(printer.render(&delta).as_deref(), Some("Chào"));
        assert_eq!(
            printer
                .render(&ConversationEvent::Completed { message_id })
                .as_deref(),
            Some("\n")
        );
    }

    #[test]
    fn test_failure_without_deltas_prints_the_stored_message() {
        let store = MessageStore::new().shared();
        let apology = Message::assistant(MessageId::new_error(), "Xin lỗi, đã có lỗi xảy ra.");
        let message_id = apology.id.clone();
        store.lock().append(apology);

        let mut printer = AnswerPrinter::new(store);
        let failed = ConversationEvent::Failed {
            message_id,
            error: "HTTP 500".to_string(),
        };
        assert_eq!(
            printer.render(&failed).as_deref(),
            Some("Xin lỗi, đã có lỗi xảy ra.\n")
        );
    }

    #[test]
    fn test_cancelled_answer_still_ends_its_line() {
        let mut printer = AnswerPrinter::new(MessageStore::new().shared());
        let delta = ConversationEvent::Delta {
            message_id: MessageId::new_error(),
            text: "Chà".to_string(),
        };
        printer.render(&delta);
        assert_eq!(printer.finish().as_deref(), Some("\n"));
        assert_eq!(printer.finish(), None);
    }

    #[test]
    fn test_new_conversation_is_announced() {
        let mut printer = AnswerPrinter::new(MessageStore::new().shared());
        let created = ConversationEvent::ConversationCreated {
            id: ConversationId::new("12"),
            title: Some("Du lịch".to_string()),
        };
        assert_eq!(
            printer.render(&created).as_deref(),
            Some("(conversation 12: Du lịch)\n")
        );
    }
}
