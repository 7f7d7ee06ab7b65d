//! Chat event types

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Events emitted while a chat exchange runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A user message was appended
    UserMessage { message: Message },

    /// The response stream opened
    StreamStart,

    /// The trailing assistant message changed
    MessageUpdate { message: Message },

    /// The exchange finished; `message` is the final assistant message, if
    /// any text arrived
    StreamEnd { message: Option<Message> },

    /// The conversation was cleared
    Cleared,

    /// The request failed
    Error { message: String },
}

impl ChatEvent {
    /// Check if this event ends an exchange
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChatEvent::StreamEnd { .. } | ChatEvent::Error { .. } | ChatEvent::Cleared
        )
    }
}
