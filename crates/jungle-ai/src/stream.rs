//! Incremental decoding of the chat endpoint's event stream
//!
//! The endpoint answers with newline-delimited `data: {...}` lines, each
//! carrying `choices[0].delta.content`, and ends with `data: [DONE]`.
//! [`StreamDecoder`] is fed the newly-arrived text of every transport chunk
//! and keeps the running assistant text in a [`StreamState`].

use serde::Deserialize;

/// Sentinel payload marking the end of a stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Accumulated assistant text for one in-flight response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    accumulated_text: String,
}

impl StreamState {
    /// Text accumulated so far
    pub fn accumulated(&self) -> &str {
        &self.accumulated_text
    }

    /// Whether nothing has been accumulated
    pub fn is_empty(&self) -> bool {
        self.accumulated_text.is_empty()
    }

    fn push(&mut self, delta: &str) {
        self.accumulated_text.push_str(delta);
    }

    fn reset(&mut self) {
        self.accumulated_text.clear();
    }
}

/// Result of feeding one chunk to the decoder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeOutcome {
    /// Accumulated text right after the last content delta in this chunk,
    /// `None` if the chunk carried no content.
    pub update: Option<String>,
    /// The terminal sentinel was seen
    pub done: bool,
}

/// What a single line did to the stream state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineEffect {
    Inert,
    Content,
    Reset,
    Done,
}

/// Line-buffered decoder for the chat event stream
#[derive(Debug, Default)]
pub struct StreamDecoder {
    state: StreamState,
    /// Incomplete trailing line carried over to the next chunk
    pending: String,
}

impl StreamDecoder {
    /// Create a decoder with an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Text accumulated so far
    pub fn accumulated(&self) -> &str {
        self.state.accumulated()
    }

    /// Current stream state
    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// Whether an incomplete line is waiting for more input
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Feed newly-arrived text. Only complete lines are decoded; a trailing
    /// partial line is kept until the next call.
    pub fn feed(&mut self, chunk: &str) -> DecodeOutcome {
        self.pending.push_str(chunk);

        let mut outcome = DecodeOutcome::default();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            if self.apply_line(&line, &mut outcome) {
                // The sentinel consumes the rest of the chunk
                self.pending.clear();
                break;
            }
        }
        outcome
    }

    /// Decode whatever partial line is left once the transport has no more
    /// data.
    pub fn finish(&mut self) -> DecodeOutcome {
        let mut outcome = DecodeOutcome::default();
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.apply_line(&line, &mut outcome);
        }
        outcome
    }

    /// Returns true when the line was the terminal sentinel.
    fn apply_line(&mut self, line: &str, outcome: &mut DecodeOutcome) -> bool {
        match self.process_line(line) {
            LineEffect::Content => {
                outcome.update = Some(self.state.accumulated().to_string());
                false
            }
            LineEffect::Done => {
                outcome.done = true;
                true
            }
            LineEffect::Inert | LineEffect::Reset => false,
        }
    }

    fn process_line(&mut self, raw: &str) -> LineEffect {
        let line = raw.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            return LineEffect::Inert;
        }

        let Some(payload) = data_payload(line) else {
            return LineEffect::Inert;
        };

        if payload.trim() == DONE_SENTINEL {
            tracing::debug!("Received [DONE] signal");
            self.state.reset();
            return LineEffect::Done;
        }

        let chunk: StreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!("Skipping malformed stream line {:?}: {}", line, e);
                return LineEffect::Inert;
            }
        };

        let Some(choice) = chunk.choices.into_iter().next() else {
            tracing::warn!("Skipping stream line without choices: {:?}", line);
            return LineEffect::Inert;
        };

        match choice.delta.content {
            Some(content) => {
                self.state.push(&content);
                LineEffect::Content
            }
            None => {
                self.state.reset();
                LineEffect::Reset
            }
        }
    }
}

/// Extract the payload of a `data:` line, dropping one optional space
fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

// Streaming response types

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(content: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn test_accumulates_across_chunks() {
        let mut decoder = StreamDecoder::new();
        let first = decoder.feed("data: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n");
        assert_eq!(first.update.as_deref(), Some("He"));
        let second = decoder.feed("data: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n");
        assert_eq!(second.update.as_deref(), Some("Hello"));
        assert_eq!(decoder.accumulated(), "Hello");
        assert!(!second.done);
    }

    #[test]
    fn test_done_resets_accumulator() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(&data("Pura vida"));
        let outcome = decoder.feed("data: [DONE]\n");
        assert!(outcome.done);
        assert_eq!(outcome.update, None);
        assert_eq!(decoder.accumulated(), "");
    }

    #[test]
    fn test_done_consumes_rest_of_chunk() {
        let mut decoder = StreamDecoder::new();
        let chunk = format!("{}data: [DONE]\n{}", data("one"), data("two"));
        let outcome = decoder.feed(&chunk);
        assert!(outcome.done);
        assert_eq!(outcome.update.as_deref(), Some("one"));
        assert_eq!(decoder.accumulated(), "");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_bare_done_line_is_inert() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(&data("sats"));
        let outcome = decoder.feed("[DONE]\nthe stream said [DONE]\n");
        assert!(!outcome.done);
        assert_eq!(outcome.update, None);
        assert_eq!(decoder.accumulated(), "sats");

        let outcome = decoder.feed(&data("[DONE] is just text here"));
        assert!(!outcome.done);
        assert_eq!(outcome.update.as_deref(), Some("sats[DONE] is just text here"));
    }

    #[test]
    fn test_duplicate_done_is_idempotent() {
        let mut decoder = StreamDecoder::new();
        assert!(decoder.feed("data: [DONE]\n").done);
        assert!(decoder.feed("data: [DONE]\n").done);
        assert_eq!(decoder.accumulated(), "");
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut decoder = StreamDecoder::new();
        let chunk = format!("{}data: {{not json\n{}", data("Bit"), data("coin"));
        let outcome = decoder.feed(&chunk);
        assert_eq!(outcome.update.as_deref(), Some("Bitcoin"));
        assert_eq!(decoder.accumulated(), "Bitcoin");
    }

    #[test]
    fn test_missing_choices_is_skipped() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(&data("sats"));
        let outcome = decoder.feed("data: {\"choices\":[]}\ndata: {\"id\":\"x\"}\n");
        assert_eq!(outcome.update, None);
        assert_eq!(decoder.accumulated(), "sats");
    }

    #[test]
    fn test_missing_content_resets() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(&data("draft"));
        let outcome =
            decoder.feed("data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n");
        assert_eq!(outcome.update, None);
        assert_eq!(decoder.accumulated(), "");

        let outcome = decoder.feed(&data("fresh"));
        assert_eq!(outcome.update.as_deref(), Some("fresh"));
    }

    #[test]
    fn test_null_content_resets() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(&data("draft"));
        decoder.feed("data: {\"choices\":[{\"delta\":{\"content\":null}}]}\n");
        assert_eq!(decoder.accumulated(), "");
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut decoder = StreamDecoder::new();
        let line = data("Lightning");
        let (head, tail) = line.split_at(20);

        let outcome = decoder.feed(head);
        assert_eq!(outcome.update, None);
        assert!(decoder.has_pending());

        let outcome = decoder.feed(tail);
        assert_eq!(outcome.update.as_deref(), Some("Lightning"));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let mut decoder = StreamDecoder::new();
        let outcome = decoder.feed(
            "\r\ndata: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\r\n\r\n\
             data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\r\n",
        );
        assert_eq!(outcome.update.as_deref(), Some("ab"));
    }

    #[test]
    fn test_inert_lines_ignored() {
        let mut decoder = StreamDecoder::new();
        let chunk = format!(": keep-alive\nevent: message\nid: 7\n{}", data("ok"));
        let outcome = decoder.feed(&chunk);
        assert_eq!(outcome.update.as_deref(), Some("ok"));
    }

    #[test]
    fn test_data_prefix_without_space() {
        let mut decoder = StreamDecoder::new();
        let outcome = decoder.feed("data:{\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n");
        assert_eq!(outcome.update.as_deref(), Some("x"));
        assert!(decoder.feed("data:[DONE]\n").done);
    }

    #[test]
    fn test_finish_flushes_partial_line() {
        let mut decoder = StreamDecoder::new();
        decoder.feed("data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}");
        assert!(decoder.has_pending());
        let outcome = decoder.finish();
        assert_eq!(outcome.update.as_deref(), Some("tail"));
        assert!(!decoder.has_pending());
        assert_eq!(decoder.finish(), DecodeOutcome::default());
    }

    #[test]
    fn test_empty_content_counts_as_update() {
        let mut decoder = StreamDecoder::new();
        let outcome =
            decoder.feed("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n");
        assert_eq!(outcome.update.as_deref(), Some(""));
        assert!(decoder.state().is_empty());
    }
}
