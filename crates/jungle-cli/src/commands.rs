//! Slash commands for interactive mode

/// A parsed slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the help text
    Help,
    /// Clear the conversation
    Clear,
    /// Print the conversation
    History,
    /// Exit the application
    Quit,
    /// Unknown command
    Unknown(String),
}

/// Parse a slash command; `None` if the input is a regular message
pub fn parse_command(input: &str) -> Option<Command> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;
    let command = rest.split_whitespace().next().unwrap_or("").to_lowercase();

    Some(match command.as_str() {
        "help" | "h" | "?" => Command::Help,
        "clear" | "c" => Command::Clear,
        "history" | "hist" => Command::History,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown(command),
    })
}

pub fn help_message() -> &'static str {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /history             Show the conversation so far
  /clear, /c           Clear conversation history
  /quit, /exit, /q     Exit jungle

Press Ctrl-C while the Educator is typing to stop the reply."#
}
