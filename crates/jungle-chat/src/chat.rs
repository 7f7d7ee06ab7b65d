//! Chat runtime: submit a message, stream the reply, persist the result

use futures::StreamExt;
use jungle_ai::{ChatMessage, ChatProvider, DecodeOutcome, StreamDecoder};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::{
    conversation::{ChatSession, Conversation, Generation},
    error::Result,
    events::ChatEvent,
    handle::ChatHandle,
    message::Message,
    store::ConversationStore,
};

/// Chat configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Send only this many of the most recent messages to the endpoint
    pub max_history: Option<usize>,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history: None,
            event_capacity: 256,
        }
    }
}

/// How a call to [`Chat::send`] ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input, nothing was sent
    Ignored,
    /// The stream ran to completion
    Completed { message: Option<Message> },
    /// The request was aborted; partial text was kept
    Aborted { message: Option<Message> },
    /// The conversation was cleared while the reply was streaming
    Discarded,
}

/// Why the streaming loop stopped
enum StreamEnd {
    Done,
    Aborted,
    Stale,
    Failed(jungle_ai::Error),
}

/// Drives one conversation against a chat provider
pub struct Chat {
    config: ChatConfig,
    provider: Arc<dyn ChatProvider>,
    handle: ChatHandle,
    event_tx: broadcast::Sender<ChatEvent>,
}

impl Chat {
    /// Create a chat, loading the stored conversation
    pub fn new(
        config: ChatConfig,
        provider: Arc<dyn ChatProvider>,
        store: ConversationStore,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let handle = ChatHandle::new(ChatSession::load(store), event_tx.clone());
        Self {
            config,
            provider,
            handle,
            event_tx,
        }
    }

    /// Subscribe to chat events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    /// Get a cloneable handle for aborting and clearing
    pub fn handle(&self) -> ChatHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Snapshot of the conversation
    pub fn messages(&self) -> Vec<Message> {
        self.handle.messages()
    }

    /// Empty the conversation and its stored copy
    pub fn clear(&self) {
        self.handle.clear();
    }

    /// Submit a user message and stream the assistant's reply into the
    /// conversation.
    ///
    /// Only request and stream failures are returned as errors; whatever
    /// text arrived before the failure stays in the conversation.
    pub async fn send(&self, text: &str) -> Result<SendOutcome> {
        let (generation, cancel, history, user_message) = {
            let mut session = self.handle.session.lock();
            let Some(generation) = session.submit_user_message(text) else {
                return Ok(SendOutcome::Ignored);
            };
            // Installed under the session lock so a clear either precedes
            // the submit or cancels this exchange
            let cancel = self.handle.request_token();
            let history = self.request_history(session.conversation());
            (generation, cancel, history, session.messages().last().cloned())
        };

        if let Some(message) = user_message {
            self.emit(ChatEvent::UserMessage { message });
        }

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.provider.stream(&history) => Some(result),
        };

        let end = match opened {
            None => StreamEnd::Aborted,
            Some(Err(e)) => StreamEnd::Failed(e),
            Some(Ok(mut chunks)) => {
                self.emit(ChatEvent::StreamStart);
                let mut decoder = StreamDecoder::new();

                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break StreamEnd::Aborted,
                        next = chunks.next() => next,
                    };

                    let outcome = match next {
                        Some(Ok(text)) => decoder.feed(&text),
                        Some(Err(e)) => break StreamEnd::Failed(e),
                        None => {
                            let outcome = decoder.finish();
                            if !self.apply(generation, &outcome) {
                                break StreamEnd::Stale;
                            }
                            break StreamEnd::Done;
                        }
                    };

                    if !self.apply(generation, &outcome) {
                        break StreamEnd::Stale;
                    }
                    if outcome.done {
                        break StreamEnd::Done;
                    }
                }
            }
        };

        self.finish(generation, end)
    }

    /// Messages sent to the endpoint for the current exchange
    fn request_history(&self, conversation: &Conversation) -> Vec<ChatMessage> {
        let history = conversation.history();
        match self.config.max_history {
            Some(limit) if history.len() > limit => history[history.len() - limit..].to_vec(),
            _ => history,
        }
    }

    /// Apply a decoded chunk. Returns false once the exchange is stale.
    fn apply(&self, generation: Generation, outcome: &DecodeOutcome) -> bool {
        let mut session = self.handle.session.lock();
        let Some(ref text) = outcome.update else {
            return session.conversation().generation() == generation;
        };

        if !session.apply_delta(generation, text) {
            return false;
        }
        if let Some(message) = session.conversation().active_message().cloned() {
            self.emit(ChatEvent::MessageUpdate { message });
        }
        true
    }

    fn finish(&self, generation: Generation, end: StreamEnd) -> Result<SendOutcome> {
        let (completed, message) = {
            let mut session = self.handle.session.lock();
            let message = session.conversation().active_message().cloned();
            (session.complete_stream(generation), message)
        };

        if !completed {
            tracing::debug!("Exchange {:?} was cleared while streaming", generation);
            return Ok(SendOutcome::Discarded);
        }

        self.emit(ChatEvent::StreamEnd {
            message: message.clone(),
        });

        match end {
            StreamEnd::Done => Ok(SendOutcome::Completed { message }),
            StreamEnd::Aborted => {
                tracing::debug!("Exchange {:?} aborted", generation);
                Ok(SendOutcome::Aborted { message })
            }
            StreamEnd::Stale => Ok(SendOutcome::Discarded),
            StreamEnd::Failed(e) => {
                tracing::debug!("Exchange {:?} failed: {}", generation, e);
                self.emit(ChatEvent::Error {
                    message: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}
