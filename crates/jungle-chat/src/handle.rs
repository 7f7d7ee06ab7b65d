//! A cloneable handle for poking the chat from external code.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{conversation::ChatSession, events::ChatEvent, message::Message};

/// A cloneable handle for poking the chat from external code.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct ChatHandle {
    pub(crate) session: Arc<Mutex<ChatSession>>,
    pub(crate) cancel: Arc<Mutex<CancellationToken>>,
    pub(crate) event_tx: broadcast::Sender<ChatEvent>,
}

impl ChatHandle {
    pub(crate) fn new(session: ChatSession, event_tx: broadcast::Sender<ChatEvent>) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            event_tx,
        }
    }

    /// Install a fresh token for a new request and return it.
    pub(crate) fn request_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        token
    }

    /// Abort the response in flight. Text received so far is kept.
    pub fn abort(&self) {
        self.cancel.lock().cancel();
    }

    /// Empty the conversation and its stored copy. A response in flight is
    /// aborted and its late chunks are dropped.
    pub fn clear(&self) {
        self.session.lock().clear();
        self.abort();
        let _ = self.event_tx.send(ChatEvent::Cleared);
    }

    /// Whether an assistant response is in flight
    pub fn is_streaming(&self) -> bool {
        self.session.lock().conversation().is_streaming()
    }

    /// Snapshot of the conversation
    pub fn messages(&self) -> Vec<Message> {
        self.session.lock().messages().to_vec()
    }
}
