//! Conversation messages

use jungle_ai::{ChatMessage, Role};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique, strictly increasing message identifier (creation time in
/// milliseconds, bumped when two messages share a millisecond)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    /// Histories written by the mobile app call this sender "ai"
    #[serde(alias = "ai")]
    Assistant,
}

impl Sender {
    /// Label shown next to a message
    pub fn label(&self) -> &'static str {
        match self {
            Sender::User => "Me",
            Sender::Assistant => "Educator",
        }
    }
}

impl From<Sender> for Role {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::User => Role::User,
            Sender::Assistant => Role::Assistant,
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
}

impl Message {
    /// Convert to the request form sent to the chat endpoint
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.sender.into(),
            content: self.text.clone(),
        }
    }
}

/// Hands out message ids that are unique and increasing
#[derive(Debug, Clone, Default)]
pub(crate) struct IdAllocator {
    last: u64,
}

impl IdAllocator {
    /// Start after the largest id already in use
    pub(crate) fn after(messages: &[Message]) -> Self {
        Self {
            last: messages.iter().map(|m| m.id.0).max().unwrap_or(0),
        }
    }

    pub(crate) fn next(&mut self) -> MessageId {
        let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        self.last = match self.last.checked_add(1) {
            Some(bumped) => now.max(bumped),
            None => {
                tracing::warn!(
                    "Stored message id {} is at the limit, restarting from the clock",
                    self.last
                );
                now
            }
        };
        MessageId(self.last)
    }
}
