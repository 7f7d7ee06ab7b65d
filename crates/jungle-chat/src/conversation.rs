//! Conversation state machine and its persisted session wrapper

use jungle_ai::ChatMessage;

use crate::{
    message::{IdAllocator, Message, Sender},
    store::ConversationStore,
};

/// Whether an assistant response is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatState {
    /// No assistant response in flight
    #[default]
    Idle,
    /// An assistant message is being extended by streamed deltas
    Streaming,
}

/// Identifies one exchange. Updates carrying an older generation belong to
/// an exchange that was superseded or cleared and are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Ordered user/assistant messages plus the streaming state
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    state: ChatState,
    /// Index of the assistant message receiving deltas
    active: Option<usize>,
    generation: Generation,
    ids: IdAllocator,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from previously stored messages
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            ids: IdAllocator::after(&messages),
            messages,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == ChatState::Streaming
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The assistant message currently receiving deltas
    pub fn active_message(&self) -> Option<&Message> {
        self.active.and_then(|i| self.messages.get(i))
    }

    /// Conversation in the form sent to the chat endpoint
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(Message::to_chat_message).collect()
    }

    /// Append a user message and start a new exchange.
    ///
    /// Blank input (after trimming) is rejected. The stored text is the raw
    /// input, untrimmed.
    pub fn submit_user_message(&mut self, text: &str) -> Option<Generation> {
        if text.trim().is_empty() {
            return None;
        }

        self.active = None;
        self.generation = self.generation.next();
        self.messages.push(Message {
            id: self.ids.next(),
            text: text.to_string(),
            sender: Sender::User,
        });
        self.state = ChatState::Streaming;
        Some(self.generation)
    }

    /// Show the accumulated response text.
    ///
    /// Replaces the text of the active assistant message in place, or starts
    /// a new assistant message when none is active. Returns false when the
    /// update belongs to a stale exchange.
    pub fn apply_delta(&mut self, generation: Generation, accumulated_text: &str) -> bool {
        if generation != self.generation {
            tracing::debug!("Dropping delta from stale exchange {:?}", generation);
            return false;
        }

        match self.active.and_then(|i| self.messages.get_mut(i)) {
            Some(message) => {
                message.text.clear();
                message.text.push_str(accumulated_text);
            }
            None => {
                self.messages.push(Message {
                    id: self.ids.next(),
                    text: accumulated_text.to_string(),
                    sender: Sender::Assistant,
                });
                self.active = Some(self.messages.len() - 1);
            }
        }
        self.state = ChatState::Streaming;
        true
    }

    /// Finish the exchange; the assistant message is final from here on.
    /// Returns false when the exchange is stale.
    pub fn complete_stream(&mut self, generation: Generation) -> bool {
        if generation != self.generation {
            return false;
        }
        self.active = None;
        self.state = ChatState::Idle;
        true
    }

    /// Drop every message and invalidate the exchange in flight
    pub fn clear(&mut self) {
        self.messages.clear();
        self.active = None;
        self.state = ChatState::Idle;
        self.generation = self.generation.next();
    }
}

/// A conversation bound to its durable store
///
/// Persists right after a user message is appended, after an exchange
/// completes, and on clear.
#[derive(Debug)]
pub struct ChatSession {
    conversation: Conversation,
    store: ConversationStore,
}

impl ChatSession {
    /// Load the stored conversation (empty if absent or unreadable)
    pub fn load(store: ConversationStore) -> Self {
        let messages = store.load();
        tracing::debug!("Loaded {} messages from {}", messages.len(), store.key());
        Self {
            conversation: Conversation::from_messages(messages),
            store,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn submit_user_message(&mut self, text: &str) -> Option<Generation> {
        let generation = self.conversation.submit_user_message(text)?;
        self.store.save(self.conversation.messages());
        Some(generation)
    }

    pub fn apply_delta(&mut self, generation: Generation, accumulated_text: &str) -> bool {
        self.conversation.apply_delta(generation, accumulated_text)
    }

    pub fn complete_stream(&mut self, generation: Generation) -> bool {
        if !self.conversation.complete_stream(generation) {
            return false;
        }
        self.store.save(self.conversation.messages());
        true
    }

    pub fn clear(&mut self) {
        self.conversation.clear();
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, MemoryStore};
    use jungle_ai::StreamDecoder;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory store that counts writes
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        writes: AtomicUsize,
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> crate::Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> crate::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> crate::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.remove(key)
        }
    }

    fn counting_session() -> (ChatSession, Arc<CountingStore>) {
        let backend = Arc::new(CountingStore::default());
        let session = ChatSession::load(ConversationStore::new(backend.clone()));
        (session, backend)
    }

    #[test]
    fn test_submit_appends_raw_text() {
        let (mut session, backend) = counting_session();

        let generation = session.submit_user_message("  What is Lightning?  ");

        assert!(generation.is_some());
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].sender, Sender::User);
        assert_eq!(session.messages()[0].text, "  What is Lightning?  ");
        assert_eq!(session.conversation().state(), ChatState::Streaming);
        assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
        assert_eq!(session.store().load(), session.messages());
    }

    #[test]
    fn test_blank_submit_is_ignored() {
        let (mut session, backend) = counting_session();

        assert!(session.submit_user_message("").is_none());
        assert!(session.submit_user_message(" \n\t ").is_none());

        assert!(session.messages().is_empty());
        assert_eq!(session.conversation().state(), ChatState::Idle);
        assert_eq!(backend.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_decoded_chunks_merge_into_one_message() {
        let mut conversation = Conversation::new();
        let generation = conversation.submit_user_message("hi").unwrap();
        let mut decoder = StreamDecoder::new();

        for chunk in [
            "data: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n",
        ] {
            if let Some(text) = decoder.feed(chunk).update {
                assert!(conversation.apply_delta(generation, &text));
            }
        }

        assert_eq!(decoder.accumulated(), "Hello");
        assert_eq!(conversation.messages().len(), 2);
        let last = conversation.messages().last().unwrap();
        assert_eq!(last.sender, Sender::Assistant);
        assert_eq!(last.text, "Hello");
    }

    #[test]
    fn test_delta_updates_in_place() {
        let mut conversation = Conversation::new();
        let generation = conversation.submit_user_message("hi").unwrap();

        conversation.apply_delta(generation, "Pura");
        let id = conversation.active_message().unwrap().id;
        conversation.apply_delta(generation, "Pura vida");

        assert_eq!(conversation.messages().len(), 2);
        let active = conversation.active_message().unwrap();
        assert_eq!(active.id, id);
        assert_eq!(active.text, "Pura vida");
    }

    #[test]
    fn test_new_exchange_starts_new_assistant_message() {
        let mut conversation = Conversation::new();

        let first = conversation.submit_user_message("one").unwrap();
        conversation.apply_delta(first, "uno");
        conversation.complete_stream(first);

        let second = conversation.submit_user_message("two").unwrap();
        conversation.apply_delta(second, "dos");
        conversation.apply_delta(second, "dos!");

        let senders: Vec<Sender> = conversation.messages().iter().map(|m| m.sender).collect();
        assert_eq!(
            senders,
            vec![Sender::User, Sender::Assistant, Sender::User, Sender::Assistant]
        );
        assert_eq!(conversation.messages()[1].text, "uno");
        assert_eq!(conversation.messages()[3].text, "dos!");
    }

    #[test]
    fn test_delta_after_completion_starts_new_message() {
        let mut conversation = Conversation::new();
        let generation = conversation.submit_user_message("hi").unwrap();
        conversation.apply_delta(generation, "first");
        conversation.complete_stream(generation);
        assert_eq!(conversation.state(), ChatState::Idle);

        conversation.apply_delta(generation, "second");

        assert_eq!(conversation.messages().len(), 3);
        assert_eq!(conversation.messages()[1].text, "first");
        assert_eq!(conversation.messages()[2].text, "second");
        assert_eq!(conversation.state(), ChatState::Streaming);
    }

    #[test]
    fn test_ids_unique_and_increasing() {
        let mut conversation = Conversation::new();
        for prompt in ["a", "b", "c"] {
            let generation = conversation.submit_user_message(prompt).unwrap();
            conversation.apply_delta(generation, prompt);
            conversation.complete_stream(generation);
        }

        let ids: Vec<_> = conversation.messages().iter().map(|m| m.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_completion_persists_round_trip() {
        let (mut session, _backend) = counting_session();
        let generation = session.submit_user_message("¿Qué es un sat?").unwrap();
        session.apply_delta(generation, "La unidad más pequeña.");
        assert!(session.complete_stream(generation));

        let reloaded = session.store().load();
        assert_eq!(reloaded, session.messages());
    }

    #[test]
    fn test_clear_empties_and_persists() {
        let (mut session, _backend) = counting_session();
        let generation = session.submit_user_message("hello").unwrap();
        session.apply_delta(generation, "hi");
        session.complete_stream(generation);

        session.clear();

        assert!(session.messages().is_empty());
        assert_eq!(session.conversation().state(), ChatState::Idle);
        assert!(session.store().load().is_empty());
    }

    #[test]
    fn test_clear_discards_stale_updates() {
        let (mut session, _backend) = counting_session();
        let generation = session.submit_user_message("hello").unwrap();
        session.apply_delta(generation, "partial");

        session.clear();

        assert!(!session.apply_delta(generation, "partial answer"));
        assert!(!session.complete_stream(generation));
        assert!(session.messages().is_empty());
        assert!(session.store().load().is_empty());
    }

    #[test]
    fn test_new_submit_supersedes_running_exchange() {
        let mut conversation = Conversation::new();
        let first = conversation.submit_user_message("one").unwrap();
        conversation.apply_delta(first, "u");
        let second = conversation.submit_user_message("two").unwrap();

        assert!(!conversation.apply_delta(first, "uno"));
        assert!(conversation.apply_delta(second, "dos"));
        assert_eq!(conversation.messages()[1].text, "u");
        assert_eq!(conversation.messages()[3].text, "dos");
    }

    #[test]
    fn test_resume_allocates_after_loaded_ids() {
        let backend = Arc::new(MemoryStore::new());
        let store = ConversationStore::new(backend);
        store.save(&[Message {
            id: crate::MessageId(u64::MAX / 2),
            text: "old".into(),
            sender: Sender::User,
        }]);

        let mut session = ChatSession::load(store);
        session.submit_user_message("new").unwrap();

        assert_eq!(session.messages().len(), 2);
        assert!(session.messages()[1].id.0 > u64::MAX / 2);
    }

    #[test]
    fn test_resume_after_max_id_does_not_overflow() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .set(
                crate::store::STORAGE_KEY,
                r#"[{"id":18446744073709551615,"text":"old","sender":"ai"}]"#,
            )
            .unwrap();

        let mut session = ChatSession::load(ConversationStore::new(backend));
        session.submit_user_message("new").unwrap();
        session.submit_user_message("newer").unwrap();

        let ids: Vec<_> = session.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids[1] < ids[2]);
        assert_ne!(ids[1], ids[0]);
    }

    #[test]
    fn test_history_maps_roles() {
        let mut conversation = Conversation::new();
        let generation = conversation.submit_user_message("q").unwrap();
        conversation.apply_delta(generation, "a");

        assert_eq!(
            conversation.history(),
            vec![ChatMessage::user("q"), ChatMessage::assistant("a")]
        );
    }
}
