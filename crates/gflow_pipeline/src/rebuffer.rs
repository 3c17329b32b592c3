//! Regrouping of raw token deltas into display-ready chunks.
//!
//! Deltas are appended to a working buffer. After every append the buffer is
//! emitted as one chunk when it holds at least `max_chars` characters,
//! contains a blank line, or ends with `.`, `!` or `?`. Whatever remains
//! when the upstream is exhausted is flushed as a final chunk. Grouping
//! changes, content never does.

use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use gflow_core::config::DEFAULT_CHUNK_MAX_CHARS;
use gflow_llm::TokenStream;

use crate::error::{PipelineError, PipelineResult};

/// Stream of display-ready chunks for one stage.
pub type ChunkStream = Pin<Box<dyn Stream<Item = PipelineResult<String>> + Send>>;

const SENTENCE_ENDINGS: &[char] = &['.', '!', '?'];

/// Chunking thresholds and pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    pub max_chars: usize,
    /// Delay after each emitted chunk. Zero disables pacing.
    pub pacing: Duration,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_CHUNK_MAX_CHARS,
            pacing: Duration::ZERO,
        }
    }
}

/// The working buffer and its boundary rule.
#[derive(Debug, Clone)]
pub struct Rebuffer {
    buf: String,
    chars: usize,
    max_chars: usize,
}

impl Rebuffer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            buf: String::new(),
            chars: 0,
            max_chars: max_chars.max(1),
        }
    }

    /// Append a delta and return the buffer if it now ends on a boundary.
    pub fn push(&mut self, delta: &str) -> Option<String> {
        if delta.is_empty() {
            return None;
        }
        self.buf.push_str(delta);
        self.chars += delta.chars().count();

        if self.at_boundary() {
            self.chars = 0;
            Some(std::mem::take(&mut self.buf))
        } else {
            None
        }
    }

    /// Take whatever is left, if anything.
    pub fn finish(&mut self) -> Option<String> {
        self.chars = 0;
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }

    pub fn pending(&self) -> &str {
        &self.buf
    }

    fn at_boundary(&self) -> bool {
        self.chars >= self.max_chars
            || self.buf.contains("\n\n")
            || self.buf.ends_with(SENTENCE_ENDINGS)
    }
}

struct RebufferState {
    tokens: TokenStream,
    rebuffer: Rebuffer,
    pacing: Duration,
    pace_next: bool,
    done: bool,
}

/// Regroup `tokens` into chunks, sleeping `policy.pacing` after each one.
///
/// The pacing delay runs when the next chunk is requested, so it is a
/// suspension point of the consumer and can be cancelled like any other.
/// An upstream error ends the stream; buffered text is discarded.
pub fn rebuffer(tokens: TokenStream, policy: ChunkPolicy) -> ChunkStream {
    let state = RebufferState {
        tokens,
        rebuffer: Rebuffer::new(policy.max_chars),
        pacing: policy.pacing,
        pace_next: false,
        done: false,
    };

    let stream = futures::stream::unfold(state, |mut st| async move {
        if st.pace_next {
            st.pace_next = false;
            if !st.pacing.is_zero() {
                tokio::time::sleep(st.pacing).await;
            }
        }

        loop {
            if st.done {
                return None;
            }
            match st.tokens.next().await {
                Some(Ok(delta)) => {
                    if let Some(chunk) = st.rebuffer.push(&delta) {
                        st.pace_next = true;
                        return Some((Ok(chunk), st));
                    }
                }
                Some(Err(err)) => {
                    st.done = true;
                    return Some((Err(PipelineError::from(err)), st));
                }
                None => {
                    st.done = true;
                    return st.rebuffer.finish().map(|chunk| (Ok(chunk), st));
                }
            }
        }
    });

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gflow_llm::GatewayError;
    use tokio::time::Instant;

    fn tokens(items: &[&str]) -> TokenStream {
        let items: Vec<_> = items.iter().map(|s| Ok(s.to_string())).collect();
        Box::pin(futures::stream::iter(items))
    }

    async fn collect(stream: ChunkStream) -> Vec<PipelineResult<String>> {
        stream.collect().await
    }

    #[test]
    fn test_sentence_boundary_groups_deltas() {
        let mut rebuffer = Rebuffer::new(50);
        assert_eq!(rebuffer.push("Hello"), None);
        assert_eq!(rebuffer.push(" world"), None);
        assert_eq!(rebuffer.push("."), Some("Hello world.".to_string()));
        assert_eq!(rebuffer.finish(), None);
    }

    #[test]
    fn test_length_and_paragraph_boundaries() {
        let mut rebuffer = Rebuffer::new(10);
        assert_eq!(rebuffer.push("abcde"), None);
        assert_eq!(rebuffer.push("fghij"), Some("abcdefghij".to_string()));

        assert_eq!(rebuffer.push("para\n"), None);
        assert_eq!(rebuffer.push("\nnext"), Some("para\n\nnext".to_string()));

        assert_eq!(rebuffer.push("Really?"), Some("Really?".to_string()));
        assert_eq!(rebuffer.push("Yes!"), Some("Yes!".to_string()));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let mut rebuffer = Rebuffer::new(4);
        assert_eq!(rebuffer.push("ééé"), None);
        assert_eq!(rebuffer.push("é"), Some("éééé".to_string()));
    }

    #[tokio::test]
    async fn test_flushes_remainder_on_exhaustion() {
        let chunks = collect(rebuffer(tokens(&["Done.", " trailing", " words"]), ChunkPolicy::default())).await;
        assert_eq!(
            chunks,
            vec![Ok("Done.".to_string()), Ok(" trailing words".to_string())]
        );
    }

    #[tokio::test]
    async fn test_content_is_preserved() {
        let deltas = [
            "The thesis ", "is well", " structured.", " However,\n", "\nthe method", "ology section lacks ",
            "detail about sampling and the interview protocol used", "?", " Overall", " a B",
        ];
        let chunks = collect(rebuffer(tokens(&deltas), ChunkPolicy::default())).await;
        let joined: String = chunks.into_iter().map(|c| c.unwrap()).collect();
        assert_eq!(joined, deltas.concat());
    }

    #[tokio::test]
    async fn test_upstream_error_ends_stream() {
        let items = vec![
            Ok("Partial".to_string()),
            Err(GatewayError::Transport("reset".into())),
            Ok("never.".to_string()),
        ];
        let chunks = collect(rebuffer(Box::pin(futures::stream::iter(items)), ChunkPolicy::default())).await;
        assert_eq!(chunks.len(), 1);
        assert!(matches!(&chunks[0], Err(PipelineError::Upstream(msg)) if msg.contains("reset")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_after_each_emission() {
        let policy = ChunkPolicy {
            max_chars: 50,
            pacing: Duration::from_millis(100),
        };
        let start = Instant::now();
        let chunks = collect(rebuffer(tokens(&["One.", "Two!", "Three"]), policy)).await;
        let elapsed = start.elapsed();

        assert_eq!(chunks.len(), 3);
        // Two boundary emissions are each followed by one delay; the final flush is not
        assert!(elapsed >= Duration::from_millis(200), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(300), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_pacing_does_not_sleep() {
        let start = Instant::now();
        let chunks = collect(rebuffer(tokens(&["A.", "B.", "C."]), ChunkPolicy::default())).await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
