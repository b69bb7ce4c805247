//! Slash command parsing for the chat application.
//!
//! Input starting with `/` controls the session and is never sent to the model.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Clear the conversation and abandon any reply in flight.
    Clear,

    /// Dismiss the current error.
    Dismiss,

    /// Send the last user message again.
    Retry,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it should be treated as
/// a regular message.
///
/// # Examples
///
/// ```
/// # use chatfolio::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
/// assert!(parse_command("Tell me about your experience").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let result = match (command.as_str(), argument) {
        ("clear", None) => ChatCommand::Clear,
        ("dismiss", None) => ChatCommand::Dismiss,
        ("retry", None) => ChatCommand::Retry,
        ("help" | "?", None) => ChatCommand::Help,
        ("quit" | "exit" | "q", None) => ChatCommand::Quit,
        ("clear" | "dismiss" | "retry" | "help" | "?" | "quit" | "exit" | "q", Some(_)) => {
            ChatCommand::Invalid(format!("/{command} takes no arguments"))
        }
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /clear                 Clear the conversation
  /dismiss               Dismiss the current error
  /retry                 Send your last message again
  /help                  Show this help message
  /quit                  Exit the chat
Press Ctrl+C while a reply is streaming to stop it."#
}
