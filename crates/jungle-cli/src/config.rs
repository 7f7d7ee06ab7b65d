//! Configuration file support

use jungle_ai::providers::{
    chat_assist::{API_KEY_ENV_VAR, DEFAULT_ENDPOINT},
    get_api_key,
};
use jungle_chat::store::{FileStore, STORAGE_KEY};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default connect/read timeout for chat requests
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for jungle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat completion endpoint
    pub endpoint: Option<String>,
    /// Bearer token (alternative to JUNGLE_API_KEY)
    pub api_key: Option<String>,
    /// Directory holding the stored conversation
    pub data_dir: Option<String>,
    /// Key the conversation is stored under
    pub storage_key: Option<String>,
    /// Connect/read timeout in seconds
    pub request_timeout_secs: Option<u64>,
    /// Send only this many recent messages with each request
    pub max_history: Option<usize>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bitcoin-jungle")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        // Check for JUNGLE_CONFIG_PATH env var first
        if let Ok(path) = std::env::var("JUNGLE_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            endpoint: Some(DEFAULT_ENDPOINT.to_string()),
            storage_key: Some(STORAGE_KEY.to_string()),
            request_timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
            ..Config::default()
        };

        default_config.save_to(&path)?;
        Ok(path)
    }

    pub fn endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    /// API key from config, then environment
    pub fn api_key(&self) -> Option<String> {
        get_api_key(self.api_key.as_deref(), API_KEY_ENV_VAR)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(FileStore::default_dir)
    }

    pub fn storage_key(&self) -> String {
        self.storage_key
            .clone()
            .unwrap_or_else(|| STORAGE_KEY.to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some("") => "",
        Some(rest) => match rest.strip_prefix('/') {
            Some(rest) => rest,
            None => return PathBuf::from(path),
        },
        None => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# jungle configuration file
# Place at ~/.config/bitcoin-jungle/config.toml (Linux) or set JUNGLE_CONFIG_PATH

# Chat completion endpoint
endpoint = "https://chat-assist.bitcoinjungle.app/api/chat"

# Directory holding the stored conversation (optional)
# data_dir = "~/.local/share/bitcoin-jungle/chat"

# Key the conversation is stored under
storage_key = "chatHistory"

# Connect/read timeout in seconds
request_timeout_secs = 60

# Send only the most recent N messages with each request (optional)
# max_history = 20

# Bearer token (optional - can also use the JUNGLE_API_KEY environment variable)
# api_key = "..."
"#
}
