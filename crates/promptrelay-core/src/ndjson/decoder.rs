//! Incremental NDJSON decoder.
//!
//! Bytes arrive from the agent's stdout in arbitrary chunks. The decoder
//! buffers any trailing partial line until the next chunk completes it.
//! A line that fails to decode is dropped on its own; it never aborts the
//! stream or affects neighbouring records.

use tracing::debug;

use super::types::DecodedEvent;

const PREVIEW_CHARS: usize = 100;

/// Stateful line decoder for one agent process.
#[derive(Debug, Default)]
pub struct EventDecoder {
    pending: Vec<u8>,
    discarded: usize,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every complete record it finished, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DecodedEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(event) = self.decode_record(start, end) {
                events.push(event);
            }
            start = end + 1;
        }
        self.pending.drain(..start);
        events
    }

    /// Decode whatever remains once the stream has closed.
    pub fn finish(&mut self) -> Option<DecodedEvent> {
        let end = self.pending.len();
        let event = self.decode_record(0, end);
        self.pending.clear();
        event
    }

    /// Number of records dropped because they were not valid JSON.
    pub const fn discarded(&self) -> usize {
        self.discarded
    }

    /// Bytes buffered while waiting for a record separator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn decode_record(&mut self, start: usize, end: usize) -> Option<DecodedEvent> {
        let line = self.pending[start..end].trim_ascii();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_slice(line) {
            Ok(raw) => Some(DecodedEvent::new(raw)),
            Err(e) => {
                self.discarded += 1;
                let preview: String = String::from_utf8_lossy(line)
                    .chars()
                    .take(PREVIEW_CHARS)
                    .collect();
                debug!(error = %e, line = %preview, "Discarding malformed NDJSON record");
                None
            }
        }
    }
}
