//! Line-oriented rendering of the conversation

use jungle_chat::{ChatEvent, Message};
use std::io::{self, Write};

/// Format a stored message for display
pub fn format_message(message: &Message) -> String {
    format!("{}: {}", message.sender.label(), message.text)
}

/// Print the whole conversation
pub fn print_history(messages: &[Message]) {
    if messages.is_empty() {
        println!("No messages yet.");
        return;
    }
    for message in messages {
        println!("{}", format_message(message));
        println!();
    }
}

/// Prints streamed assistant text incrementally.
///
/// Each update carries the full accumulated text; only the part not yet on
/// screen is written. If the text stops extending what was printed (the
/// stream reset), the new text starts on a fresh line.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    printed: String,
    started: bool,
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to write for an update, `None` if nothing changed
    pub fn render(&mut self, text: &str) -> Option<String> {
        let mut out = String::new();
        if !self.started {
            out.push_str("Educator: ");
            self.started = true;
        }

        match text.strip_prefix(self.printed.as_str()) {
            Some(suffix) => out.push_str(suffix),
            None => {
                out.push('\n');
                out.push_str(text);
            }
        }
        self.printed = text.to_string();

        if out.is_empty() { None } else { Some(out) }
    }

    /// React to a chat event
    pub fn handle(&mut self, event: &ChatEvent) {
        if let ChatEvent::MessageUpdate { message } = event {
            if let Some(out) = self.render(&message.text) {
                print!("{}", out);
                let _ = io::stdout().flush();
            }
        } else if event.is_terminal() {
            self.finish();
        }
    }

    /// End the current line if anything was printed
    pub fn finish(&mut self) {
        if self.started {
            println!();
            self.started = false;
            self.printed.clear();
        }
    }
}
