//! jungle-chat: Streaming chat runtime
//!
//! This crate keeps the ordered user/assistant conversation, merges streamed
//! assistant output into a single trailing message and persists the
//! conversation to a local key-value store.

pub mod chat;
pub mod conversation;
pub mod error;
pub mod events;
pub mod handle;
pub mod message;
pub mod store;

pub use chat::{Chat, ChatConfig, SendOutcome};
pub use conversation::{ChatSession, ChatState, Conversation, Generation};
pub use error::{Error, Result};
pub use events::ChatEvent;
pub use handle::ChatHandle;
pub use message::{Message, MessageId, Sender};
pub use store::{ConversationStore, FileStore, KeyValueStore, MemoryStore};
