//! Decoding of upstream `data: {json}` event streams into text deltas.
//!
//! Backends frame their output as lines of the form
//! `data: {"choices":[{"delta":{"content":"..."}}]}` and finish with
//! `data: [DONE]`. Lines that are blank, comments, or not the expected
//! JSON shape are skipped.

use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::GatewayError;
use crate::gateway::TokenStream;

/// Sentinel payload that ends a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Longest upstream line held in memory, terminator included.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Classification of a single upstream line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    Delta(String),
    Done,
    Skip,
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Classify one line of upstream output.
pub fn parse_line(line: &str) -> SseLine {
    let line = line.trim();
    let Some(payload) = line.strip_prefix("data:") else {
        if !line.is_empty() {
            trace!("Skipping non-data line: {}", line);
        }
        return SseLine::Skip;
    };
    let payload = payload.trim();

    if payload == DONE_SENTINEL {
        return SseLine::Done;
    }

    match serde_json::from_str::<ChunkPayload>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(SseLine::Delta)
            .unwrap_or(SseLine::Skip),
        Err(err) => {
            trace!("Skipping malformed upstream frame: {}", err);
            SseLine::Skip
        }
    }
}

/// Incremental line splitter over raw bytes.
///
/// Bytes are held until a full line is available, so multi-byte characters
/// split across network chunks decode correctly. A line that outgrows
/// [`MAX_LINE_BYTES`] is dropped up to its terminating newline.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    discarding: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the classified complete lines it finished.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseLine> {
        let mut lines = Vec::new();
        let mut rest = bytes;

        while !rest.is_empty() {
            let newline = rest.iter().position(|&b| b == b'\n');
            let (head, tail) = match newline {
                Some(pos) => rest.split_at(pos + 1),
                None => (rest, &rest[rest.len()..]),
            };
            rest = tail;

            if self.discarding {
                self.discarding = newline.is_none();
                continue;
            }
            if self.buf.len() + head.len() > MAX_LINE_BYTES {
                debug!("Dropping upstream line longer than {} bytes", MAX_LINE_BYTES);
                self.buf.clear();
                self.discarding = newline.is_none();
                continue;
            }

            self.buf.extend_from_slice(head);
            if newline.is_some() {
                let raw = std::mem::take(&mut self.buf);
                match parse_line(&String::from_utf8_lossy(&raw)) {
                    SseLine::Skip => {}
                    line => lines.push(line),
                }
            }
        }
        lines
    }

    /// Classify whatever is left once the byte stream ends.
    pub fn finish(&mut self) -> Option<SseLine> {
        self.discarding = false;
        if self.buf.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buf);
        match parse_line(&String::from_utf8_lossy(&raw)) {
            SseLine::Skip => None,
            line => Some(line),
        }
    }
}

struct DecodeState<S> {
    bytes: std::pin::Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
    idle_timeout: Option<Duration>,
}

impl<S> DecodeState<S> {
    fn absorb(&mut self, lines: impl IntoIterator<Item = SseLine>) {
        for line in lines {
            match line {
                SseLine::Delta(text) => self.pending.push_back(text),
                SseLine::Done => {
                    self.finished = true;
                    break;
                }
                SseLine::Skip => {}
            }
        }
    }
}

/// Turn a raw byte stream into a stream of text deltas.
///
/// The stream ends at `[DONE]` or when the bytes run out. With an idle
/// timeout, waiting longer than it for the next chunk yields
/// [`GatewayError::Timeout`] and ends the stream.
pub fn token_stream<S, B, E>(bytes: S, idle_timeout: Option<Duration>) -> TokenStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
        idle_timeout,
    };

    let stream = futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(token) = st.pending.pop_front() {
                return Some((Ok(token), st));
            }
            if st.finished {
                return None;
            }

            let next = match st.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, st.bytes.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        st.finished = true;
                        return Some((Err(GatewayError::Timeout(limit)), st));
                    }
                },
                None => st.bytes.next().await,
            };

            match next {
                Some(Ok(chunk)) => {
                    let lines = st.decoder.push(chunk.as_ref());
                    st.absorb(lines);
                }
                Some(Err(err)) => {
                    st.finished = true;
                    return Some((Err(GatewayError::Transport(err.to_string())), st));
                }
                None => {
                    let tail = st.decoder.finish();
                    st.absorb(tail);
                    st.finished = true;
                }
            }
        }
    });

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn frame(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line(frame("Hi").trim()), SseLine::Delta("Hi".into()));
        assert_eq!(parse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_line("data:[DONE]\r"), SseLine::Done);
        assert_eq!(parse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_line("data: {not json"), SseLine::Skip);
        assert_eq!(parse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#), SseLine::Skip);
        assert_eq!(parse_line(r#"data: {"choices":[]}"#), SseLine::Skip);
        assert_eq!(parse_line(""), SseLine::Skip);
    }

    #[test]
    fn test_decoder_handles_split_lines_and_utf8() {
        let full = frame("héllo");
        let bytes = full.as_bytes();
        // Split inside the two-byte 'é'
        let split = full.find('é').unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec![SseLine::Delta("héllo".into())]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_finish_parses_unterminated_tail() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), Some(SseLine::Done));
    }

    #[test]
    fn test_decoder_drops_oversized_lines() {
        let filler = vec![b'x'; MAX_LINE_BYTES / 2 + 1];
        let mut decoder = SseDecoder::new();

        assert!(decoder.push(b"data: ").is_empty());
        assert!(decoder.push(&filler).is_empty());
        assert!(decoder.push(&filler).is_empty());
        assert!(decoder.buf.is_empty());
        assert!(decoder.push(&filler).is_empty());
        assert!(decoder.buf.is_empty());

        let tail = format!("xxx\n{}", frame("ok"));
        assert_eq!(decoder.push(tail.as_bytes()), vec![SseLine::Delta("ok".into())]);
        assert_eq!(decoder.finish(), None);
    }

    #[tokio::test]
    async fn test_token_stream_stops_at_done() {
        let body = format!("{}{}data: [DONE]\n\n{}", frame("A"), frame("B"), frame("ignored"));
        let chunks: Vec<Result<Vec<u8>, Infallible>> = body
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(c.to_vec()))
            .collect();

        let tokens: Vec<String> = token_stream(futures::stream::iter(chunks), None)
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_token_stream_surfaces_transport_errors() {
        let chunks: Vec<Result<Vec<u8>, String>> =
            vec![Ok(frame("x").into_bytes()), Err("connection reset".to_string())];

        let items: Vec<_> = token_stream(futures::stream::iter(chunks), None).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("x".to_string()));
        assert!(matches!(&items[1], Err(GatewayError::Transport(msg)) if msg.contains("reset")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_stream_idle_timeout() {
        let stalled = futures::stream::pending::<Result<Vec<u8>, Infallible>>();
        let mut tokens = token_stream(stalled, Some(Duration::from_secs(5)));

        let first = tokens.next().await;
        assert_eq!(first, Some(Err(GatewayError::Timeout(Duration::from_secs(5)))));
        assert_eq!(tokens.next().await, None);
    }
}
