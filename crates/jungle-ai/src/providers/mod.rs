//! Chat endpoint implementations

pub mod chat_assist;

use crate::{ChatMessage, Result};
use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

pub use chat_assist::ChatAssistProvider;

/// A stream of newly-arrived response text, one item per transport chunk
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Trait for chat completion endpoints
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Open a streaming response for the given conversation history
    async fn stream(&self, messages: &[ChatMessage]) -> Result<ChunkStream>;
}

/// Get an API key from a provided value or the environment
pub fn get_api_key(provided: Option<&str>, env_var: &str) -> Option<String> {
    if let Some(key) = provided {
        return Some(key.to_string());
    }

    std::env::var(env_var).ok().filter(|key| !key.is_empty())
}
