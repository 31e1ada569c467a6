//! Streaming reassembler: accumulates model output chunk by chunk, mirrors a
//! display version to the caller, and swaps the reasoning region for a
//! placeholder while it is being generated.
//!
//! Only the first reasoning region gets placeholder treatment. Once it has
//! been resolved, later markers are displayed as ordinary text.

use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::extraction::cleaner::{REASONING_CLOSE, REASONING_OPEN};
use crate::llm_client::LlmError;

/// Shown in place of reasoning text while the region is still open.
pub const THINKING_PLACEHOLDER: &str = "[Thinking...]";
/// Shown when the stream ends inside a reasoning region.
pub const THINKING_UNFINISHED: &str = "[Reasoning did not finish]";

fn completed_annotation(elapsed: Duration) -> String {
    format!("[Reasoning completed in {:.1}s]", elapsed.as_secs_f64())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionState {
    Normal,
    InRegion,
}

/// Per-call streaming state. Created fresh for every generation.
#[derive(Debug)]
pub struct StreamSession {
    raw: String,
    display: String,
    /// Tail of the last chunk that could be the start of a split marker.
    pending: String,
    state: RegionState,
    /// Byte offset of the placeholder inside `display`.
    placeholder_at: usize,
    region_started: Option<Instant>,
    region_resolved: bool,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSession {
    pub fn new() -> Self {
        Self {
            raw: String::new(),
            display: String::new(),
            pending: String::new(),
            state: RegionState::Normal,
            placeholder_at: 0,
            region_started: None,
            region_resolved: false,
        }
    }

    /// Everything received so far, reasoning regions included.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The user-facing text: reasoning replaced by placeholder or annotation.
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Feeds one chunk.
    pub fn push(&mut self, chunk: &str) {
        self.raw.push_str(chunk);

        let mut incoming = std::mem::take(&mut self.pending);
        incoming.push_str(chunk);
        let mut rest = incoming.as_str();

        loop {
            match self.state {
                RegionState::Normal if self.region_resolved => {
                    self.display.push_str(rest);
                    break;
                }
                RegionState::Normal => {
                    if let Some(pos) = find_marker(rest, REASONING_OPEN) {
                        self.display.push_str(&rest[..pos]);
                        self.open_region();
                        rest = &rest[pos + REASONING_OPEN.len()..];
                        continue;
                    }
                    let split = rest.len() - partial_marker_len(rest, REASONING_OPEN);
                    self.display.push_str(&rest[..split]);
                    self.pending = rest[split..].to_string();
                    break;
                }
                RegionState::InRegion => {
                    if let Some(pos) = find_marker(rest, REASONING_CLOSE) {
                        self.close_region();
                        rest = &rest[pos + REASONING_CLOSE.len()..];
                        continue;
                    }
                    let split = rest.len() - partial_marker_len(rest, REASONING_CLOSE);
                    self.pending = rest[split..].to_string();
                    break;
                }
            }
        }
    }

    /// Flushes held-back text and settles an unterminated region.
    pub fn finish(&mut self) {
        match self.state {
            RegionState::Normal => {
                let pending = std::mem::take(&mut self.pending);
                self.display.push_str(&pending);
            }
            RegionState::InRegion => {
                self.pending.clear();
                self.display.truncate(self.placeholder_at);
                self.display.push_str(THINKING_UNFINISHED);
            }
        }
    }

    /// The accumulated raw text, or `None` if nothing arrived.
    pub fn into_raw(self) -> Option<String> {
        (!self.raw.is_empty()).then_some(self.raw)
    }

    fn open_region(&mut self) {
        debug!("Reasoning region opened");
        self.state = RegionState::InRegion;
        self.placeholder_at = self.display.len();
        self.display.push_str(THINKING_PLACEHOLDER);
        self.region_started = Some(Instant::now());
    }

    fn close_region(&mut self) {
        let elapsed = self
            .region_started
            .take()
            .map(|started| started.elapsed())
            .unwrap_or_default();
        debug!(elapsed_ms = elapsed.as_millis() as u64, "Reasoning region closed");

        self.display.truncate(self.placeholder_at);
        self.display.push_str(&completed_annotation(elapsed));
        self.state = RegionState::Normal;
        self.region_resolved = true;
    }
}

/// Case-insensitive search for an ASCII marker.
fn find_marker(haystack: &str, marker: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(marker)
}

/// Length of the longest proper prefix of `marker` that `text` ends with.
fn partial_marker_len(text: &str, marker: &str) -> usize {
    let bytes = text.as_bytes();
    let marker = marker.as_bytes();
    (1..marker.len())
        .rev()
        .find(|&len| len <= bytes.len() && bytes[bytes.len() - len..].eq_ignore_ascii_case(&marker[..len]))
        .unwrap_or(0)
}

/// Drives a chunk stream to completion.
///
/// `on_update(display, false)` fires after every chunk, and
/// `on_update(display, true)` fires once when the stream is exhausted. The
/// cancellation token is checked at every chunk boundary; cancelling stops
/// consumption and returns whatever arrived so far without an error.
///
/// Returns `Ok(None)` when no text was produced at all.
pub async fn consume<S, F>(
    mut chunks: S,
    cancel: &CancellationToken,
    mut on_update: F,
) -> Result<Option<String>, LlmError>
where
    S: Stream<Item = Result<String, LlmError>> + Unpin,
    F: FnMut(&str, bool),
{
    let mut session = StreamSession::new();
    let mut received = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(chunks = received, "Generation cancelled by caller");
                return Ok(session.into_raw());
            }
            next = chunks.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                received += 1;
                session.push(&chunk);
                on_update(session.display(), false);
            }
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }

    session.finish();
    on_update(session.display(), true);
    debug!(chunks = received, bytes = session.raw().len(), "Stream finished");
    Ok(session.into_raw())
}
