//! Incremental decoder for OpenAI-style server-sent-event bodies
//!
//! Bytes arrive in arbitrary chunks. The decoder carries incomplete UTF-8
//! sequences and incomplete records across reads, so feeding a body in one
//! piece or split at any byte boundary yields the same record sequence.

use serde::Deserialize;

/// Separator between records
const RECORD_SEPARATOR: &str = "\n\n";
/// Prefix of a data record
const DATA_PREFIX: &str = "data: ";
/// Payload that terminates the stream
const DONE_SENTINEL: &str = "[DONE]";

/// One parsed record from the body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseRecord {
    /// A non-empty content increment
    Delta(String),
    /// The `[DONE]` terminator
    Done,
    /// Well-formed chunk carrying no content (role-only or finish chunks)
    Empty,
    /// Record that is not a `data: ` record (comments, `event:` lines, blanks)
    Ignored,
    /// Data record whose payload could not be interpreted
    Malformed { reason: String, payload: String },
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Option<Vec<ChunkChoice>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Streaming decoder state for one response body
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of a UTF-8 sequence split across reads
    utf8_tail: Vec<u8>,
    /// Decoded text not yet terminated by a record separator
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every record it completed, in order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseRecord> {
        self.decode_utf8(chunk);

        let mut records = Vec::new();
        while let Some(end) = self.buffer.find(RECORD_SEPARATOR) {
            let record: String = self.buffer.drain(..end + RECORD_SEPARATOR.len()).collect();
            records.push(parse_record(&record[..end]));
        }
        records
    }

    /// Flush at end of body; returns the unterminated fragment, if any
    pub fn finish(&mut self) -> Option<String> {
        if !self.utf8_tail.is_empty() {
            self.utf8_tail.clear();
            self.buffer.push(char::REPLACEMENT_CHARACTER);
        }

        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    /// Number of decoded characters waiting for a separator
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn decode_utf8(&mut self, chunk: &[u8]) {
        let mut pending = std::mem::take(&mut self.utf8_tail);
        pending.extend_from_slice(chunk);

        let mut start = 0;
        while start < pending.len() {
            match std::str::from_utf8(&pending[start..]) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    start = pending.len();
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&pending[start..valid_end]));
                    match e.error_len() {
                        Some(invalid) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + invalid;
                        }
                        None => {
                            // Sequence continues in the next chunk
                            self.utf8_tail = pending[valid_end..].to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Interpret one complete record (without its trailing separator)
pub fn parse_record(record: &str) -> SseRecord {
    let Some(rest) = record.strip_prefix(DATA_PREFIX) else {
        return SseRecord::Ignored;
    };

    let payload = rest.trim();
    if payload == DONE_SENTINEL {
        return SseRecord::Done;
    }

    let malformed = |reason: String| SseRecord::Malformed {
        reason,
        payload: payload.to_string(),
    };

    let chunk: ChunkPayload = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => return malformed(format!("invalid JSON: {}", e)),
    };

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .or_else(|| error.as_str().map(str::to_string))
            .unwrap_or_else(|| error.to_string());
        return malformed(format!("provider error: {}", message));
    }

    let Some(first) = chunk.choices.and_then(|choices| choices.into_iter().next()) else {
        return malformed("missing choices[0]".to_string());
    };

    let Some(delta) = first.delta else {
        return malformed("missing choices[0].delta".to_string());
    };

    match delta.content {
        Some(content) if !content.is_empty() => SseRecord::Delta(content),
        _ => SseRecord::Empty,
    }
}
