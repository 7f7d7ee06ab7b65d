//! jungle-ai: Streaming chat completion client
//!
//! This crate talks to the Bitcoin Jungle chat assistant endpoint and turns
//! its Server-Sent-Events style response into accumulated assistant text.

pub mod error;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use providers::{ChatProvider, ChunkStream};
pub use stream::{DecodeOutcome, StreamDecoder, StreamState};
pub use types::*;
