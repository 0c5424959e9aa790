//! /conversations, /open, /rename, /pin, /unpin, /delete

use vchat_api::{ConversationId, ConversationSummary, HttpBackend};
use vchat_core::ConversationController;

/// A call against the registered user's conversation list
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationCommand {
    List,
    Open(ConversationId),
    Rename { id: ConversationId, title: String },
    Pin { id: ConversationId, pinned: bool },
    Delete(ConversationId),
}

impl ConversationCommand {
    /// Parse the arguments of `command`; `Err` carries the usage line.
    pub fn parse(command: &str, args: &str) -> Result<Self, String> {
        let mut words = args.splitn(2, ' ');
        let id = words
            .next()
            .filter(|id| !id.is_empty())
            .map(ConversationId::new);
        let rest = words.next().map(str::trim).unwrap_or("");

        let usage = |shape: &str| format!("Usage: /{} {}", command, shape);
        match command {
            "conversations" | "ls" => Ok(Self::List),
            "open" => id.map(Self::Open).ok_or_else(|| usage("<id>")),
            "delete" => id.map(Self::Delete).ok_or_else(|| usage("<id>")),
            "pin" | "unpin" => id
                .map(|id| Self::Pin {
                    id,
                    pinned: command == "pin",
                })
                .ok_or_else(|| usage("<id>")),
            "rename" => match id {
                Some(id) if !rest.is_empty() => Ok(Self::Rename {
                    id,
                    title: rest.to_string(),
                }),
                _ => Err(usage("<id> <title>")),
            },
            _ => Err(format!("Unknown conversation command: /{}", command)),
        }
    }

    /// Run against the backend and describe the result for the user
    pub async fn run(self, backend: &HttpBackend, controller: &ConversationController) -> String {
        let result = match self {
            Self::List => backend
                .list_conversations()
                .await
                .map(|list| format_list(&list, controller.conversation_id().as_ref())),
            Self::Open(id) => {
                return match controller.switch_conversation(&id).await {
                    Ok(count) => format!("Opened conversation {} ({} messages)", id, count),
                    Err(vchat_core::Error::NotRegistered) => not_registered(),
                    Err(e) => format!("Failed to open conversation {}: {}", id, e),
                };
            }
            Self::Rename { id, title } => backend
                .rename_conversation(&id, &title)
                .await
                .map(|summary| format!("Renamed {} to \"{}\"", summary.id, summary.title)),
            Self::Pin { id, pinned } => backend.set_pinned(&id, pinned).await.map(|state| {
                let verb = if state.pinned { "Pinned" } else { "Unpinned" };
                format!("{} conversation {}", verb, state.id)
            }),
            Self::Delete(id) => backend.delete_conversation(&id).await.map(|()| {
                if controller.conversation_id().as_ref() == Some(&id) {
                    controller.new_chat();
                    format!("Deleted conversation {} and started a new one", id)
                } else {
                    format!("Deleted conversation {}", id)
                }
            }),
        };

        match result {
            Ok(text) => text,
            Err(vchat_api::Error::Unauthorized) => not_registered(),
            Err(e) => format!("Error: {}", e),
        }
    }
}

fn not_registered() -> String {
    "Conversations are only kept for registered sessions. Restart with --registered.".to_string()
}

fn format_list(list: &[ConversationSummary], current: Option<&ConversationId>) -> String {
    if list.is_empty() {
        return "No conversations yet.".to_string();
    }

    let mut output = String::from("Conversations:\n");
    for summary in list {
        let marker = if current == Some(&summary.id) { "*" } else { " " };
        let pin = if summary.pinned { "📌 " } else { "" };
        output.push_str(&format!(
            " {} {:>6}  {}{} ({} messages)\n",
            marker,
            summary.id,
            pin,
            summary.title,
            summary.message_count
        ));
    }
    output.push_str("\nContinue one with: /open <id>");
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requires_ids() {
        assert_eq!(
            ConversationCommand::parse("delete", ""),
            Err("Usage: /delete <id>".to_string())
        );
        assert_eq!(
            ConversationCommand::parse("rename", "5"),
            Err("Usage: /rename <id> <title>".to_string())
        );
        assert_eq!(
            ConversationCommand::parse("pin", "5"),
            Ok(ConversationCommand::Pin {
                id: ConversationId::new("5"),
                pinned: true,
            })
        );
    }

    #[test]
    fn test_list_marks_current_and_pinned() {
        let list: Vec<ConversationSummary> = serde_json::from_str(
            r#"[
                {"id": 1, "title": "Du lịch", "pinned": true, "message_count": 4},
                {"id": 2, "title": "Nấu ăn", "message_count": 2}
            ]"#,
        )
        .unwrap();

        let text = format_list(&list, Some(&ConversationId::new("2")));
        let lines: Vec<_> = text.lines().collect();
        assert!(lines[1].contains("📌 Du lịch (4 messages)"));
        assert!(lines[1].starts_with("  "));
        assert!(lines[2].starts_with(" *"));
        assert!(text.ends_with("/open <id>"));
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(format_list(&[], None), "No conversations yet.");
    }

    #[tokio::test]
    async fn test_guest_session_is_told_to_register() {
        use std::sync::Arc;
        use vchat_core::NullNotifier;

        let backend = Arc::new(HttpBackend::guest("http://127.0.0.1:9"));
        let controller = ConversationController::new(backend.clone(), Arc::new(NullNotifier));

        for command in [
            ConversationCommand::List,
            ConversationCommand::Open(ConversationId::new("1")),
            ConversationCommand::Delete(ConversationId::new("1")),
        ] {
            assert_eq!(command.run(&backend, &controller).await, not_registered());
        }
    }
}
