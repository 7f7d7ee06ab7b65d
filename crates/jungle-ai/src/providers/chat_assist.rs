//! Bitcoin Jungle chat-assist endpoint

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::fmt::Display;
use std::time::Duration;
use tokio_stream::Stream;

use crate::{
    error::{Error, Result},
    providers::{ChatProvider, ChunkStream},
    types::{ChatMessage, ChatRequest},
};

/// Default chat completion endpoint
pub const DEFAULT_ENDPOINT: &str = "https://chat-assist.bitcoinjungle.app/api/chat";

/// Environment variable holding an optional bearer token
pub const API_KEY_ENV_VAR: &str = "JUNGLE_API_KEY";

/// Streaming client for the chat-assist endpoint
pub struct ChatAssistProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    headers: HashMap<String, String>,
}

impl ChatAssistProvider {
    /// Create a provider for an endpoint URL
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: None,
            headers: HashMap::new(),
        }
    }

    /// Create a provider with connect and read timeouts
    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            ..Self::new(endpoint)
        })
    }

    /// Send a bearer token with every request
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Add an extra header to every request
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Endpoint this provider posts to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for ChatAssistProvider {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

#[async_trait]
impl ChatProvider for ChatAssistProvider {
    async fn stream(&self, messages: &[ChatMessage]) -> Result<ChunkStream> {
        tracing::debug!(
            "Sending chat request to {} ({} messages)",
            self.endpoint,
            messages.len()
        );

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&ChatRequest::streaming(messages));

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        for (key, value) in &self.headers {
            if let (Ok(name), Ok(val)) = (
                key.parse::<reqwest::header::HeaderName>(),
                value.parse::<reqwest::header::HeaderValue>(),
            ) {
                request = request.header(name, val);
            } else {
                tracing::warn!("Ignoring invalid header {:?}", key);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(status.as_u16(), body));
        }

        tracing::debug!("Chat response opened: {}", status);
        Ok(Box::pin(text_chunks(response.bytes_stream())))
    }
}

/// Turn a byte stream into UTF-8 text chunks without splitting characters
fn text_chunks<S, B, E>(body: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    stream! {
        let mut body = Box::pin(body);
        let mut carry = Utf8Carry::default();

        while let Some(item) = body.next().await {
            match item {
                Ok(bytes) => {
                    let text = carry.push(bytes.as_ref());
                    if !text.is_empty() {
                        yield Ok(text);
                    }
                }
                Err(e) => {
                    yield Err(Error::Stream(e.to_string()));
                    return;
                }
            }
        }

        let rest = carry.finish();
        if !rest.is_empty() {
            yield Ok(rest);
        }
    }
}

/// Holds back an incomplete trailing UTF-8 sequence between chunks
#[derive(Debug, Default)]
struct Utf8Carry {
    buf: Vec<u8>,
}

impl Utf8Carry {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.buf.extend_from_slice(bytes);

        let valid = match std::str::from_utf8(&self.buf) {
            Ok(_) => self.buf.len(),
            // Incomplete sequence at the end: keep it for the next chunk
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => {
                let text = String::from_utf8_lossy(&self.buf).into_owned();
                self.buf.clear();
                return text;
            }
        };

        let rest = self.buf.split_off(valid);
        let head = std::mem::replace(&mut self.buf, rest);
        String::from_utf8_lossy(&head).into_owned()
    }

    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        text
    }
}
