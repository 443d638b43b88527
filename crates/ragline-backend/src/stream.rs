//! Server-sent-event decoding for streaming chat completions.

use std::pin::Pin;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::BackendError;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, String>> + Send>>;

/// One decoded SSE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A non-empty content delta.
    Fragment(String),
    /// The `[DONE]` sentinel.
    Done,
    /// Comments, keep-alives, empty deltas and malformed frames.
    Skip,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Decode a single line of an SSE body.
pub fn parse_sse_line(line: &str) -> SseEvent {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim_start();

    if data == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .filter(|content| !content.is_empty())
            .map(SseEvent::Fragment)
            .unwrap_or(SseEvent::Skip),
        Err(e) => {
            debug!("Skipping malformed stream frame: {}", e);
            SseEvent::Skip
        }
    }
}

/// Incremental sequence of text fragments from a streaming completion.
pub struct ChatStream {
    inner: ByteStream,
    buffer: Vec<u8>,
    chunk_timeout: Duration,
    finished: bool,
    saw_done: bool,
}

impl ChatStream {
    /// Wrap a reqwest byte stream.
    pub(crate) fn new<S, B>(stream: S, chunk_timeout: Duration) -> Self
    where
        S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
        B: AsRef<[u8]>,
    {
        let inner = stream.map(|chunk| {
            chunk
                .map(|bytes| bytes.as_ref().to_vec())
                .map_err(|e| e.to_string())
        });
        Self::from_byte_stream(Box::pin(inner), chunk_timeout)
    }

    /// Build a stream from pre-split body chunks.
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: Send + 'static,
    {
        let inner = futures_util::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<Vec<u8>, String>(c.into_bytes())),
        );
        Self::from_byte_stream(Box::pin(inner), Duration::from_secs(60))
    }

    fn from_byte_stream(inner: ByteStream, chunk_timeout: Duration) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            chunk_timeout,
            finished: false,
            saw_done: false,
        }
    }

    /// Whether the `[DONE]` sentinel was received.
    pub fn saw_done(&self) -> bool {
        self.saw_done
    }

    /// Next content fragment, `None` once the stream has terminated.
    pub async fn next_fragment(&mut self) -> Option<Result<String, BackendError>> {
        loop {
            if let Some(line) = self.take_line() {
                match parse_sse_line(&line) {
                    SseEvent::Fragment(text) => return Some(Ok(text)),
                    SseEvent::Done => {
                        self.finished = true;
                        self.saw_done = true;
                        self.buffer.clear();
                        return None;
                    }
                    SseEvent::Skip => continue,
                }
            }

            if self.finished {
                return None;
            }

            match tokio::time::timeout(self.chunk_timeout, self.inner.next()).await {
                Err(_) => {
                    self.finished = true;
                    return Some(Err(BackendError::Timeout(self.chunk_timeout)));
                }
                Ok(Some(Ok(bytes))) => self.buffer.extend_from_slice(&bytes),
                Ok(Some(Err(e))) => {
                    self.finished = true;
                    return Some(Err(BackendError::Stream(e)));
                }
                Ok(None) => {
                    trace!("Stream closed by backend");
                    self.finished = true;
                    // Flush a trailing line that had no newline.
                    if !self.buffer.is_empty() {
                        self.buffer.push(b'\n');
                    }
                }
            }
        }
    }

    /// Drain the stream into one string.
    pub async fn collect_text(mut self) -> Result<String, BackendError> {
        let mut text = String::new();
        while let Some(fragment) = self.next_fragment().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("buffered", &self.buffer.len())
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn test_parse_fragment() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#),
            SseEvent::Fragment("Hi".to_string())
        );
    }

    #[test]
    fn test_parse_done_and_noise() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseEvent::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseEvent::Skip);
        assert_eq!(parse_sse_line(""), SseEvent::Skip);
        assert_eq!(parse_sse_line("data: {not json"), SseEvent::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseEvent::Skip
        );
        assert_eq!(parse_sse_line(r#"data: {"choices":[]}"#), SseEvent::Skip);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let mut stream = ChatStream::from_chunks(vec![
            chunk("Dogs need rabies shots."),
            "data: {\"choices\": [ broken\n\n".to_string(),
            "data: [DONE]\n\n".to_string(),
        ]);

        let first = stream.next_fragment().await.unwrap().unwrap();
        assert_eq!(first, "Dogs need rabies shots.");
        assert!(stream.next_fragment().await.is_none());
        assert!(stream.saw_done());
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let whole = chunk("Hello");
        let (a, b) = whole.split_at(10);
        let stream = ChatStream::from_chunks(vec![
            a.to_string(),
            b.to_string(),
            chunk(", world"),
            "data: [DONE]\n".to_string(),
        ]);

        assert_eq!(stream.collect_text().await.unwrap(), "Hello, world");
    }

    #[tokio::test]
    async fn test_nothing_after_done_is_read() {
        let stream = ChatStream::from_chunks(vec![
            format!("{}data: [DONE]\n\n{}", chunk("a"), chunk("b")),
        ]);
        assert_eq!(stream.collect_text().await.unwrap(), "a");
    }

    #[tokio::test]
    async fn test_eof_without_done_flushes_trailing_line() {
        let mut stream = ChatStream::from_chunks(vec![
            r#"data: {"choices":[{"delta":{"content":"tail"}}]}"#.to_string(),
        ]);
        assert_eq!(stream.next_fragment().await.unwrap().unwrap(), "tail");
        assert!(stream.next_fragment().await.is_none());
        assert!(!stream.saw_done());
    }
}
