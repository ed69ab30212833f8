//! Pull-based event stream over one chat-completion response
//!
//! `ChatStream` wraps the raw body of a single request. Each call to
//! [`ChatStream::next_event`] yields the next content delta, and the stream
//! ends with exactly one terminal event (`Done`, `Aborted` or `Failed`).
//! After the terminal event every call returns `None`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::llm_engine::provider::{ByteStream, ChatError};
use crate::llm_engine::sse::{SseDecoder, SseRecord};

/// Log progress every N chunks
const PROGRESS_EVERY: usize = 10;

/// Event produced by a [`ChatStream`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Content increment, in arrival order
    Delta(String),
    /// Stream finished; `signaled` is false when the body ended without `[DONE]`
    Done { answer: String, signaled: bool },
    /// Caller cancelled; `partial` is everything received so far
    Aborted { partial: String },
    /// Body read failed mid-stream
    Failed(ChatError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Delta(_))
    }
}

/// Counters collected while reading a body
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    pub chunks: usize,
    pub bytes: usize,
    pub records: usize,
    pub deltas: usize,
    pub malformed: usize,
    /// Records with no content (role-only or finish chunks)
    pub empty: usize,
    pub first_chunk_latency: Option<Duration>,
    pub elapsed: Duration,
}

/// Decoded response stream for one request
pub struct ChatStream {
    label: String,
    body: Option<ByteStream>,
    decoder: SseDecoder,
    pending: VecDeque<SseRecord>,
    answer: String,
    cancel: CancellationToken,
    /// Longest wait for the next body chunk; `None` waits forever
    idle_timeout: Option<Duration>,
    body_ended: bool,
    finished: bool,
    started: Instant,
    stats: StreamStats,
}

impl ChatStream {
    /// Wrap a response body. `label` names the endpoint in log lines.
    pub fn new(label: impl Into<String>, body: ByteStream, cancel: CancellationToken) -> Self {
        Self {
            label: label.into(),
            body: Some(body),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            answer: String::new(),
            cancel,
            idle_timeout: None,
            body_ended: false,
            finished: false,
            started: Instant::now(),
            stats: StreamStats::default(),
        }
    }

    /// Fail the stream when no chunk arrives within `limit`
    pub fn with_idle_timeout(mut self, limit: Duration) -> Self {
        self.idle_timeout = Some(limit);
        self
    }

    /// Answer accumulated so far
    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Pull the next event
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if self.finished {
                return None;
            }

            if self.cancel.is_cancelled() {
                return Some(self.abort());
            }

            while let Some(record) = self.pending.pop_front() {
                self.stats.records += 1;
                match record {
                    SseRecord::Delta(delta) => {
                        self.stats.deltas += 1;
                        self.answer.push_str(&delta);
                        return Some(StreamEvent::Delta(delta));
                    }
                    SseRecord::Done => {
                        self.pending.clear();
                        return Some(self.complete(true));
                    }
                    SseRecord::Malformed { reason, payload } => {
                        self.stats.malformed += 1;
                        log::warn!(
                            "[{}] Skipping malformed stream record ({}): {}",
                            self.label,
                            reason,
                            payload
                        );
                    }
                    SseRecord::Empty => self.stats.empty += 1,
                    SseRecord::Ignored => {}
                }
            }

            if self.body_ended {
                return Some(self.complete(false));
            }

            let Some(body) = self.body.as_mut() else {
                return Some(self.complete(false));
            };

            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                chunk = next_chunk(body, self.idle_timeout) => Some(chunk),
            };

            match next {
                None => return Some(self.abort()),
                Some(Some(Ok(chunk))) => self.on_chunk(&chunk),
                Some(Some(Err(e))) => return Some(self.fail(e)),
                Some(None) => self.on_body_end(),
            }
        }
    }

    /// Drive the stream to its terminal event, passing deltas to `on_delta`
    pub async fn drain<F>(&mut self, mut on_delta: F) -> Option<StreamEvent>
    where
        F: FnMut(&str),
    {
        while let Some(event) = self.next_event().await {
            match event {
                StreamEvent::Delta(delta) => on_delta(&delta),
                terminal => return Some(terminal),
            }
        }
        None
    }

    fn on_chunk(&mut self, chunk: &[u8]) {
        if self.stats.first_chunk_latency.is_none() {
            let latency = self.started.elapsed();
            self.stats.first_chunk_latency = Some(latency);
            crate::stream_perf!(
                self.label,
                "First chunk after {:.2?} ({} bytes)",
                latency,
                chunk.len()
            );
        }

        self.stats.chunks += 1;
        self.stats.bytes += chunk.len();
        self.pending.extend(self.decoder.push(chunk));

        if self.stats.chunks % PROGRESS_EVERY == 0 {
            crate::stream_perf!(
                self.label,
                "Progress: {} chunks, {} bytes, answer {} chars",
                self.stats.chunks,
                self.stats.bytes,
                self.answer.chars().count()
            );
        }
    }

    fn on_body_end(&mut self) {
        self.body_ended = true;
        self.body = None;
        if let Some(fragment) = self.decoder.finish() {
            log::debug!(
                "[{}] Discarding unterminated trailing fragment: {}",
                self.label,
                fragment
            );
        }
    }

    fn complete(&mut self, signaled: bool) -> StreamEvent {
        self.finish();
        if !signaled {
            log::info!("[{}] Stream ended without [DONE] terminator", self.label);
        }
        StreamEvent::Done {
            answer: std::mem::take(&mut self.answer),
            signaled,
        }
    }

    fn abort(&mut self) -> StreamEvent {
        self.finish();
        log::info!(
            "[{}] Stream cancelled after {} chars",
            self.label,
            self.answer.chars().count()
        );
        StreamEvent::Aborted {
            partial: std::mem::take(&mut self.answer),
        }
    }

    fn fail(&mut self, error: ChatError) -> StreamEvent {
        self.finish();
        log::error!("[{}] Stream failed: {}", self.label, error);
        StreamEvent::Failed(error)
    }

    fn finish(&mut self) {
        self.finished = true;
        // Dropping the body releases the connection
        self.body = None;
        self.pending.clear();
        self.stats.elapsed = self.started.elapsed();

        log::info!(
            "[{}] Stream closed: {} chunks, {} bytes, {} deltas, {} empty, {} malformed, first chunk {:?}, total {:.2?}",
            self.label,
            self.stats.chunks,
            self.stats.bytes,
            self.stats.deltas,
            self.stats.empty,
            self.stats.malformed,
            self.stats.first_chunk_latency,
            self.stats.elapsed
        );
    }
}

async fn next_chunk(
    body: &mut ByteStream,
    idle_timeout: Option<Duration>,
) -> Option<Result<Bytes, ChatError>> {
    let Some(limit) = idle_timeout else {
        return body.next().await;
    };
    match tokio::time::timeout(limit, body.next()).await {
        Ok(chunk) => chunk,
        Err(_) => Some(Err(ChatError::transport(format!(
            "No data received for {:?}",
            limit
        )))),
    }
}
