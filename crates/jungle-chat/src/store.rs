//! Persisted conversation storage
//!
//! The conversation lives under a single key of a local key-value store and
//! every save replaces the whole stored value.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{error::Result, message::Message};

/// Key the conversation is stored under
pub const STORAGE_KEY: &str = "chatHistory";

/// Minimal string key-value store
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `None` when the key is absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key; removing an absent key succeeds
    fn remove(&self, key: &str) -> Result<()>;
}

/// Store keeping one file per key in a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Get the default data directory
    pub fn default_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bitcoin-jungle")
            .join("chat")
    }

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        // Write beside the target and rename so readers never see a partial value
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store, lost when dropped
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Durable copy of the conversation
///
/// `load`, `save` and `clear` never fail: errors are logged and treated as
/// an empty result or a no-op. The `try_` variants report them.
#[derive(Clone)]
pub struct ConversationStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
}

impl ConversationStore {
    /// Store the conversation under the default key
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(backend, STORAGE_KEY)
    }

    pub fn with_key(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    /// A store that keeps nothing beyond the process
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the stored conversation, empty on any error
    pub fn load(&self) -> Vec<Message> {
        match self.try_load() {
            Ok(messages) => messages,
            Err(e) => {
                tracing::error!("Error loading chat history: {}", e);
                Vec::new()
            }
        }
    }

    /// Replace the stored conversation, logging on error
    pub fn save(&self, messages: &[Message]) {
        if let Err(e) = self.try_save(messages) {
            tracing::error!("Error saving chat history: {}", e);
        }
    }

    /// Remove the stored conversation, logging on error
    pub fn clear(&self) {
        match self.try_clear() {
            Ok(()) => tracing::debug!("Chat history cleared"),
            Err(e) => tracing::error!("Error clearing chat history: {}", e),
        }
    }

    pub fn try_load(&self) -> Result<Vec<Message>> {
        match self.backend.get(&self.key)? {
            Some(content) => Ok(serde_json::from_str(&content)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn try_save(&self, messages: &[Message]) -> Result<()> {
        let content = serde_json::to_string(messages)?;
        self.backend.set(&self.key, &content)
    }

    pub fn try_clear(&self) -> Result<()> {
        self.backend.remove(&self.key)
    }
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
