//! /history command - print the current transcript

use super::CommandResult;
use vchat_api::{Message, Role};

pub struct HistoryCommand;

impl HistoryCommand {
    pub fn execute(transcript: &[Message]) -> CommandResult {
        if transcript.is_empty() {
            return CommandResult::Message("No messages yet.".to_string());
        }

        let mut output = String::new();
        for (i, message) in transcript.iter().enumerate() {
            let who = match message.role {
                Role::User => "you",
                Role::Assistant => "vchat",
            };
            let text = if message.thinking {
                "(đang xử lý...)"
            } else {
                message.content.as_str()
            };
            output.push_str(&format!(
                "[{}] {} {:>5}: {}\n",
                i,
                message.created_at.with_timezone(&chrono::Local).format("%H:%M"),
                who,
                text
            ));
        }
        output.pop();
        CommandResult::Message(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vchat_api::{MessageId, StreamId};

    #[test]
    fn test_empty_transcript() {
        assert_eq!(
            HistoryCommand::execute(&[]),
            CommandResult::Message("No messages yet.".to_string())
        );
    }

    #[test]
    fn test_lists_every_turn() {
        let transcript = vec![
            Message::user("Xin chào"),
            Message::assistant(MessageId::ServerAssigned("4".into()), "Chào bạn"),
            Message::placeholder(MessageId::placeholder_for(&StreamId::new("s"))),
        ];
        let CommandResult::Message(text) = HistoryCommand::execute(&transcript) else {
            panic!("expected a message");
        };

        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("[0]") && lines[0].ends_with("you: Xin chào"));
        assert!(lines[1].ends_with("vchat: Chào bạn"));
        assert!(lines[2].ends_with("(đang xử lý...)"));
    }
}
