//! Slash commands for interactive mode

mod conversations;
mod history;

pub use conversations::ConversationCommand;
pub use history::HistoryCommand;

use vchat_api::Message;

/// Result of executing a slash command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Drop the transcript and start a fresh conversation
    NewChat,
    /// Show a message to the user (not sent to the backend)
    Message(String),
    /// Run a call against the registered conversation list
    Conversation(ConversationCommand),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, transcript: &[Message]) -> Option<CommandResult> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let parts: Vec<&str> = rest.splitn(2, ' ').collect();
    let command = parts[0].to_lowercase();
    let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "new" | "n" => CommandResult::NewChat,

        "history" => HistoryCommand::execute(transcript),

        "quit" | "exit" | "q" => CommandResult::Exit,

        "conversations" | "ls" | "open" | "rename" | "pin" | "unpin" | "delete" => {
            match ConversationCommand::parse(&command, args) {
                Ok(cmd) => CommandResult::Conversation(cmd),
                Err(usage) => CommandResult::Message(usage),
            }
        }

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?           Show this help message
  /new, /n                Start a new conversation
  /history                Show the current transcript
  /conversations, /ls     List your conversations (registered)
  /open <id>              Continue conversation <id> (registered)
  /rename <id> <title>    Rename a conversation (registered)
  /pin <id>, /unpin <id>  Pin or unpin a conversation (registered)
  /delete <id>            Delete a conversation (registered)
  /quit, /exit, /q        Exit vchat

Press Ctrl-C while an answer is streaming to stop it."#
        .to_string()
}
